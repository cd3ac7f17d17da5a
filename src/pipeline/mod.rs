pub mod orchestration;
pub mod services;
pub mod types;

pub use orchestration::{ShotPipeline, TickOutcome};
pub use services::{EventPublisher, HandPoseProvider, PersonDetector, PipelineEvent};
pub use types::{HandObservation, HitEvent, PersonDetection, TeamLabel};
