use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamLabel {
    TeamA,
    TeamB,
    Unclassified,
}

impl TeamLabel {
    pub fn is_classified(&self) -> bool {
        !matches!(self, TeamLabel::Unclassified)
    }
}

impl fmt::Display for TeamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamLabel::TeamA => write!(f, "team_a"),
            TeamLabel::TeamB => write!(f, "team_b"),
            TeamLabel::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Names the scoring service knows the teams by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamNames {
    pub team_a: String,
    pub team_b: String,
}

impl Default for TeamNames {
    fn default() -> Self {
        Self {
            team_a: "yellow".to_string(),
            team_b: "green".to_string(),
        }
    }
}

impl TeamNames {
    pub fn name(&self, label: TeamLabel) -> String {
        match label {
            TeamLabel::TeamA => self.team_a.clone(),
            TeamLabel::TeamB => self.team_b.clone(),
            TeamLabel::Unclassified => label.to_string(),
        }
    }
}
