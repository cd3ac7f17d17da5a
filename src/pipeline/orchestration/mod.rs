pub mod frame_context;
pub mod kill_streak;
pub mod shot_pipeline;

pub use frame_context::{FrameContext, FrameMetrics, ProcessingStepType};
pub use kill_streak::KillStreak;
pub use shot_pipeline::{ShotPipeline, TickOutcome};
