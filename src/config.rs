use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::pipeline::types::{HandKeyStrategy, TeamLabel, TeamNames};

const ENV_PREFIX: &str = "LASERTAG";
const ENV_SEPARATOR: &str = "__";

/// Top-level configuration. Every field has a default, so an empty source
/// yields a runnable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub player: PlayerConfig,
    pub teams: TeamNames,
    pub gesture: GestureConfig,
    pub hand_selection: HandSelectionConfig,
    pub team_classifier: TeamClassifierConfig,
    pub hit_validation: HitValidationConfig,
    pub stream: StreamConfig,
    pub reporting: ReportingConfig,
    pub snapshots: SnapshotConfig,
    pub pipeline: PipelineConfig,
}

/// Who is holding the camera.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub username: String,
    pub team: TeamLabel,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            username: "player1".to_string(),
            team: TeamLabel::TeamA,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum frame-to-frame thumb-tip travel, in normalized image height,
    /// that counts as a cock or fire motion.
    pub cock_threshold: f32,
    /// Minimum wall-clock time between two shots from the same hand.
    pub shot_cooldown_ms: u64,
    /// Sideways thumb offset from its MCP joint, in normalized image width,
    /// that counts as "thumb extended" when the thumb is not raised.
    pub thumb_offset_threshold: f32,
    pub hand_key: HandKeyStrategy,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            cock_threshold: 0.02,
            // ten frames at 30 fps
            shot_cooldown_ms: 333,
            thumb_offset_threshold: 0.08,
            hand_key: HandKeyStrategy::TrackId,
        }
    }
}

impl GestureConfig {
    pub fn shot_cooldown(&self) -> Duration {
        Duration::from_millis(self.shot_cooldown_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandSelectionConfig {
    /// Margin added around the landmark extents, in normalized units.
    pub padding: f32,
}

impl Default for HandSelectionConfig {
    fn default() -> Self {
        Self { padding: 0.02 }
    }
}

/// HSV bounds in OpenCV convention: hue `0..=179`, saturation and value
/// `0..=255`. A lower hue greater than the upper hue wraps through red.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeamColorRange {
    pub team: TeamLabel,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TeamClassifierConfig {
    /// Top of the torso window as a fraction of the person box height.
    pub roi_top: f32,
    /// Height of the torso window as a fraction of the person box height.
    pub roi_height: f32,
    /// Minimum mask coverage of the torso window, in percent.
    pub min_coverage_percent: f32,
    /// Minimum number of mask pixels, regardless of coverage.
    pub min_pixel_area: u32,
    /// Side of the square structuring element used by the morphology passes.
    pub kernel_size: u32,
    /// Label used when no team color is present.
    pub default_team: TeamLabel,
    /// Checked in order; the first listed wins an exact pixel-count tie.
    pub colors: Vec<TeamColorRange>,
}

impl Default for TeamClassifierConfig {
    fn default() -> Self {
        Self {
            roi_top: 0.15,
            roi_height: 0.45,
            min_coverage_percent: 15.0,
            min_pixel_area: 500,
            kernel_size: 5,
            default_team: TeamLabel::Unclassified,
            colors: vec![
                // high-vis yellow
                TeamColorRange {
                    team: TeamLabel::TeamA,
                    lower: [20, 100, 100],
                    upper: [35, 255, 255],
                },
                TeamColorRange {
                    team: TeamLabel::TeamB,
                    lower: [40, 70, 70],
                    upper: [85, 255, 255],
                },
            ],
        }
    }
}

/// Which targets count as a valid hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TargetRule {
    /// Any classified team other than the shooter's own.
    OpposingTeam,
    /// Only the named team.
    DesignatedTeam { team: TeamLabel },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HitValidationConfig {
    /// Person boxes covering more than this fraction of the shooter's hand
    /// box are treated as the shooter's own arm and ignored.
    pub self_overlap_threshold: f32,
    pub target_rule: TargetRule,
}

impl Default for HitValidationConfig {
    fn default() -> Self {
        Self {
            self_overlap_threshold: 0.3,
            target_rule: TargetRule::OpposingTeam,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Length-prefixed raw RGB frames pushed by a media relay.
    #[default]
    Tcp,
    WebRtc,
    /// Any URL ffmpeg can pull (RTMP, RTSP, HLS), decoded by a subprocess.
    Ffmpeg,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub kind: StreamKind,
    /// `host:port` for TCP, the signaling URL for WebRTC.
    pub url: String,
    pub queue_capacity: usize,
    pub read_timeout_ms: u64,
    /// Consecutive failed reads before the connection is torn down.
    pub failure_threshold: u32,
    pub reconnect_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_connect_attempts: u32,
    pub stun_servers: Vec<String>,
    /// Largest frame side accepted from a relay, in pixels.
    pub max_frame_dimension: u32,
    /// Size ffmpeg scales decoded frames to, in pixels.
    pub frame_width: u32,
    pub frame_height: u32,
    pub ffmpeg_path: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            kind: StreamKind::Tcp,
            url: "127.0.0.1:3344".to_string(),
            queue_capacity: 2,
            read_timeout_ms: 100,
            failure_threshold: 30,
            reconnect_interval_ms: 2000,
            connect_timeout_ms: 10_000,
            max_connect_attempts: 3,
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            max_frame_dimension: 4096,
            frame_width: 1280,
            frame_height: 720,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl StreamConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Hit endpoint of the scoring service. Reporting is disabled when unset.
    pub endpoint: Option<String>,
    pub timeout_ms: u64,
    pub queue_capacity: usize,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 5000,
            queue_capacity: 32,
        }
    }
}

impl ReportingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Where shot frames are written. Snapshots are disabled when unset.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run person detection on every frame for overlays, not only on shots.
    pub detect_persons_every_frame: bool,
    pub event_buffer_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detect_persons_every_frame: false,
            event_buffer_size: 64,
        }
    }
}

impl Configuration {
    /// Defaults, overridden by `path` (if given), overridden by
    /// `LASERTAG__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );
        let configuration: Configuration = builder.build()?.try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.player.username.trim().is_empty() {
            return invalid("player.username must not be empty");
        }
        if !self.player.team.is_classified() {
            return invalid("player.team must be team_a or team_b");
        }
        if self.gesture.cock_threshold <= 0.0 {
            return invalid("gesture.cock_threshold must be greater than 0");
        }
        if self.hand_selection.padding < 0.0 {
            return invalid("hand_selection.padding must not be negative");
        }

        let classifier = &self.team_classifier;
        if classifier.roi_top < 0.0
            || classifier.roi_height <= 0.0
            || classifier.roi_top + classifier.roi_height > 1.0
        {
            return invalid("team_classifier torso window must lie within the person box");
        }
        if !(0.0..=100.0).contains(&classifier.min_coverage_percent) {
            return invalid("team_classifier.min_coverage_percent must be between 0 and 100");
        }
        if classifier.kernel_size == 0 || classifier.kernel_size % 2 == 0 {
            return invalid("team_classifier.kernel_size must be odd");
        }
        if classifier.colors.is_empty() {
            return invalid("team_classifier.colors must not be empty");
        }
        if classifier.colors.iter().any(|c| !c.team.is_classified()) {
            return invalid("team_classifier.colors may only name team_a or team_b");
        }
        if classifier
            .colors
            .iter()
            .any(|c| c.lower[0] > 179 || c.upper[0] > 179)
        {
            return invalid("team_classifier hue bounds must be between 0 and 179");
        }

        if !(0.0..=1.0).contains(&self.hit_validation.self_overlap_threshold) {
            return invalid("hit_validation.self_overlap_threshold must be between 0.0 and 1.0");
        }
        if let TargetRule::DesignatedTeam { team } = self.hit_validation.target_rule {
            if !team.is_classified() {
                return invalid("hit_validation designated team must be team_a or team_b");
            }
        }

        if self.stream.queue_capacity == 0 {
            return invalid("stream.queue_capacity must be greater than 0");
        }
        if self.stream.failure_threshold == 0 {
            return invalid("stream.failure_threshold must be greater than 0");
        }
        if self.stream.max_connect_attempts == 0 {
            return invalid("stream.max_connect_attempts must be greater than 0");
        }
        if self.stream.max_frame_dimension == 0 {
            return invalid("stream.max_frame_dimension must be greater than 0");
        }
        if self.stream.frame_width == 0
            || self.stream.frame_height == 0
            || self.stream.frame_width > self.stream.max_frame_dimension
            || self.stream.frame_height > self.stream.max_frame_dimension
        {
            return invalid("stream frame size must be within 1..=max_frame_dimension");
        }
        if self.reporting.queue_capacity == 0 {
            return invalid("reporting.queue_capacity must be greater than 0");
        }
        if self.pipeline.event_buffer_size == 0 {
            return invalid("pipeline.event_buffer_size must be greater than 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // `load` reads the process environment, so tests calling it run one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_valid() {
        let configuration = Configuration::default();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.stream.queue_capacity, 2);
        assert_eq!(configuration.stream.failure_threshold, 30);
        assert_eq!(
            configuration.stream.reconnect_interval(),
            Duration::from_secs(2)
        );
        assert_eq!(configuration.reporting.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn loads_overrides_from_toml_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[player]
username = "maverick"
team = "team_b"

[gesture]
shot_cooldown_ms = 500

[hit_validation]
self_overlap_threshold = 0.4
target_rule = {{ mode = "designated_team", team = "team_a" }}

[stream]
kind = "web_rtc"
url = "https://example.invalid/webRTC/play"
"#
        )
        .unwrap();

        let configuration = Configuration::load(Some(file.path())).unwrap();
        assert_eq!(configuration.player.username, "maverick");
        assert_eq!(configuration.player.team, TeamLabel::TeamB);
        assert_eq!(
            configuration.gesture.shot_cooldown(),
            Duration::from_millis(500)
        );
        // untouched fields keep their defaults
        assert_eq!(configuration.gesture.cock_threshold, 0.02);
        assert_eq!(
            configuration.hit_validation.target_rule,
            TargetRule::DesignatedTeam {
                team: TeamLabel::TeamA
            }
        );
        assert_eq!(configuration.stream.kind, StreamKind::WebRtc);
        assert_eq!(configuration.team_classifier.colors.len(), 2);
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[gesture]\nshot_cooldown_ms = 500").unwrap();

        std::env::set_var("LASERTAG__GESTURE__SHOT_COOLDOWN_MS", "777");
        std::env::set_var("LASERTAG__STREAM__KIND", "ffmpeg");
        std::env::set_var("LASERTAG__STREAM__FRAME_WIDTH", "320");
        let from_file = Configuration::load(Some(file.path()));
        let from_env = Configuration::load(None);
        std::env::remove_var("LASERTAG__GESTURE__SHOT_COOLDOWN_MS");
        std::env::remove_var("LASERTAG__STREAM__KIND");
        std::env::remove_var("LASERTAG__STREAM__FRAME_WIDTH");

        for configuration in [from_file.unwrap(), from_env.unwrap()] {
            assert_eq!(
                configuration.gesture.shot_cooldown(),
                Duration::from_millis(777)
            );
            assert_eq!(configuration.stream.kind, StreamKind::Ffmpeg);
            assert_eq!(configuration.stream.frame_width, 320);
            assert_eq!(configuration.stream.frame_height, 720);
        }
    }

    #[test]
    fn rejects_frame_size_outside_dimension_bound() {
        let mut configuration = Configuration::default();
        configuration.stream.frame_width = 0;
        assert!(configuration.validate().is_err());

        let mut configuration = Configuration::default();
        configuration.stream.max_frame_dimension = 1000;
        configuration.stream.frame_width = 1280;
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn rejects_even_kernel_and_empty_queue() {
        let mut configuration = Configuration::default();
        configuration.team_classifier.kernel_size = 4;
        assert!(configuration.validate().is_err());

        let mut configuration = Configuration::default();
        configuration.stream.queue_capacity = 0;
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn rejects_unclassified_shooter_team() {
        let mut configuration = Configuration::default();
        configuration.player.team = TeamLabel::Unclassified;
        assert!(configuration.validate().is_err());
    }
}
