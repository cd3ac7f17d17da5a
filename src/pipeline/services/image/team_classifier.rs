use image::imageops;
use tracing::debug;

use super::{hsv, morphology};
use crate::common::{BoundingBox, Frame};
use crate::config::{TeamClassifierConfig, TeamColorRange};
use crate::pipeline::types::TeamLabel;

/// Mask statistics for one configured team color.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorCoverage {
    pub team: TeamLabel,
    pub pixel_count: u32,
    pub coverage_percent: f32,
    pub present: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamClassification {
    pub label: TeamLabel,
    /// Torso window actually analyzed, in frame pixels.
    pub region: Option<(u32, u32, u32, u32)>,
    pub coverages: Vec<ColorCoverage>,
}

/// Reads a person's team from the high-vis color on their upper torso.
pub struct TeamClassifier {
    config: TeamClassifierConfig,
}

impl TeamClassifier {
    pub fn new(config: TeamClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, frame: &Frame, person: &BoundingBox) -> TeamLabel {
        self.analyze(frame, person).label
    }

    pub fn analyze(&self, frame: &Frame, person: &BoundingBox) -> TeamClassification {
        let Some((x, y, w, h)) = self.torso_region(person, frame.width(), frame.height()) else {
            debug!("Person box {:?} has an empty torso window", person);
            return TeamClassification {
                label: self.config.default_team,
                region: None,
                coverages: Vec::new(),
            };
        };

        let region = imageops::crop_imm(frame.image(), x, y, w, h).to_image();
        let total = (w * h) as f32;

        let coverages: Vec<ColorCoverage> = self
            .config
            .colors
            .iter()
            .map(|color| self.measure(&region, color, total))
            .collect();

        let mut best: Option<&ColorCoverage> = None;
        for coverage in coverages.iter().filter(|c| c.present) {
            // strict comparison keeps the first configured color on a tie
            if best.map_or(true, |b| coverage.pixel_count > b.pixel_count) {
                best = Some(coverage);
            }
        }
        let label = best.map_or(self.config.default_team, |b| b.team);

        debug!(
            "Classified torso window ({}, {}, {}x{}) as {}: {:?}",
            x, y, w, h, label, coverages
        );

        TeamClassification {
            label,
            region: Some((x, y, w, h)),
            coverages,
        }
    }

    fn measure(
        &self,
        region: &image::RgbImage,
        color: &TeamColorRange,
        total: f32,
    ) -> ColorCoverage {
        let kernel = self.config.kernel_size;
        let mask = hsv::threshold(region, color.lower, color.upper);
        let mask = morphology::open(&mask, kernel);
        let mask = morphology::close(&mask, kernel);
        let mask = morphology::dilate(&mask, kernel);

        let pixel_count = morphology::count_set(&mask);
        let coverage_percent = if total > 0.0 {
            pixel_count as f32 / total * 100.0
        } else {
            0.0
        };
        let present = coverage_percent > self.config.min_coverage_percent
            && pixel_count > self.config.min_pixel_area;

        ColorCoverage {
            team: color.team,
            pixel_count,
            coverage_percent,
            present,
        }
    }

    /// Upper-torso window of the person box, clamped to the frame, as
    /// `(x, y, width, height)`.
    fn torso_region(
        &self,
        person: &BoundingBox,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let top = person.y1 + person.height() * self.config.roi_top;
        let window = BoundingBox::new(
            person.x1,
            top,
            person.x2,
            top + person.height() * self.config.roi_height,
        )
        .clamp(frame_width as f32, frame_height as f32);

        let x = window.x1.floor() as u32;
        let y = window.y1.floor() as u32;
        let x2 = (window.x2.ceil() as u32).min(frame_width);
        let y2 = (window.y2.ceil() as u32).min(frame_height);
        if x2 <= x || y2 <= y {
            return None;
        }
        Some((x, y, x2 - x, y2 - y))
    }
}
