use crate::common::Frame;
use crate::error::DetectionError;
use crate::pipeline::types::{HandObservation, PersonDetection};

/// Maps a frame to the hands visible in it. An empty result is a normal
/// outcome, not an error.
pub trait HandPoseProvider: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<HandObservation>, DetectionError>;
}

/// Maps a frame to person boxes in frame pixels, in the detector's native
/// output order.
pub trait PersonDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<PersonDetection>, DetectionError>;
}
