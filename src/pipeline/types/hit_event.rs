use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::BoundingBox;
use crate::pipeline::types::TeamLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitVerdict {
    /// Crosshair on a person of a team the current rule allows.
    Hit,
    /// Crosshair on a person the rule does not allow (own team, or not the
    /// designated target team).
    WrongTeam,
    /// Crosshair on a person whose team could not be determined.
    Unclassified,
    /// No eligible person under the crosshair.
    Miss,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub shooter_id: String,
    pub timestamp: DateTime<Utc>,
    pub target_team: Option<TeamLabel>,
    pub target_box: Option<BoundingBox>,
    pub verdict: HitVerdict,
    pub valid: bool,
}

impl HitEvent {
    pub fn miss(shooter_id: impl Into<String>) -> Self {
        Self {
            shooter_id: shooter_id.into(),
            timestamp: Utc::now(),
            target_team: None,
            target_box: None,
            verdict: HitVerdict::Miss,
            valid: false,
        }
    }

    pub fn on_target(
        shooter_id: impl Into<String>,
        target_team: TeamLabel,
        target_box: BoundingBox,
        verdict: HitVerdict,
    ) -> Self {
        Self {
            shooter_id: shooter_id.into(),
            timestamp: Utc::now(),
            target_team: Some(target_team),
            target_box: Some(target_box),
            valid: verdict == HitVerdict::Hit,
            verdict,
        }
    }
}

/// Body of the scoring service's hit endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitReport {
    pub hitter_username: String,
    pub target_team: String,
}
