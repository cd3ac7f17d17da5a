pub mod hsv;
pub mod morphology;
pub mod team_classifier;

pub use team_classifier::{ColorCoverage, TeamClassification, TeamClassifier};
