pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod intake;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use error::{AppError, ConfigError, DetectionError, ReportingError, ResourceError, StreamError};
pub use pipeline::{PipelineEvent, ShotPipeline};

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
