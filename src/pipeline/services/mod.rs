pub mod detection;
pub mod events;
pub mod gesture;
pub mod hand_selector;
pub mod hit_validator;
pub mod image;
pub mod reporting;
pub mod snapshot;

pub use detection::{HandPoseProvider, PersonDetector};
pub use events::{EventPublisher, PipelineEvent};
pub use gesture::{GestureEvent, GestureTracker};
pub use hand_selector::{HandSelector, SelectedHand};
pub use hit_validator::HitValidator;
pub use self::image::TeamClassifier;
pub use reporting::{HitReporter, HttpHitReporter, ReportDispatcher};
pub use snapshot::SnapshotWriter;
