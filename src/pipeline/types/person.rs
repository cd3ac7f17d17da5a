use serde::{Deserialize, Serialize};

use crate::common::BoundingBox;

/// A person box in frame pixels, as returned by the person detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl PersonDetection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}
