use serde::{Deserialize, Serialize};

use crate::common::BoundingBox;

pub const LANDMARK_COUNT: usize = 21;

/// A single hand landmark. `x` and `y` are normalized to the frame
/// (`0.0..=1.0`, y grows downward); `z` is relative depth, smaller is closer
/// to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Indices into the 21-point hand skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandLandmark {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexMcp = 5,
    IndexPip = 6,
    IndexDip = 7,
    IndexTip = 8,
    MiddleMcp = 9,
    MiddlePip = 10,
    MiddleDip = 11,
    MiddleTip = 12,
    RingMcp = 13,
    RingPip = 14,
    RingDip = 15,
    RingTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandObservation {
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub handedness: Handedness,
    /// Stable identifier from the pose provider's tracker, when it has one.
    pub track_id: Option<u64>,
}

impl HandObservation {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT], handedness: Handedness) -> Self {
        Self {
            landmarks,
            handedness,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u64) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn landmark(&self, which: HandLandmark) -> Landmark {
        self.landmarks[which as usize]
    }

    /// Landmark extents padded by `padding` on every side, clamped to the
    /// normalized frame.
    pub fn bounding_box(&self, padding: f32) -> BoundingBox {
        let mut extents = BoundingBox::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for lm in &self.landmarks {
            extents.x1 = extents.x1.min(lm.x);
            extents.y1 = extents.y1.min(lm.y);
            extents.x2 = extents.x2.max(lm.x);
            extents.y2 = extents.y2.max(lm.y);
        }
        extents.pad(padding).clamp(1.0, 1.0)
    }

    pub fn key(&self, strategy: HandKeyStrategy) -> HandKey {
        match (strategy, self.track_id) {
            (HandKeyStrategy::TrackId, Some(id)) => HandKey::Track(id),
            _ => HandKey::Handedness(self.handedness),
        }
    }
}

/// Identity used to key per-hand gesture state.
///
/// Handedness alone cannot tell two same-handed hands apart and is not stable
/// across tracking dropouts; a tracker id is preferred whenever the pose
/// provider supplies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandKey {
    Track(u64),
    Handedness(Handedness),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandKeyStrategy {
    #[default]
    TrackId,
    Handedness,
}
