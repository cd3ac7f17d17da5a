mod hand;
mod hit_event;
mod person;
mod team;

pub use hand::{
    HandKey, HandKeyStrategy, HandLandmark, HandObservation, Handedness, Landmark, LANDMARK_COUNT,
};
pub use hit_event::{HitEvent, HitReport, HitVerdict};
pub use person::PersonDetection;
pub use team::{TeamLabel, TeamNames};
