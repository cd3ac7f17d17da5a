use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Stream Error: {0}")]
    Stream(#[from] StreamError),
    #[error("Reporting Error: {0}")]
    Reporting(#[from] ReportingError),
    #[error("Resource Error: {0}")]
    Resource(#[from] ResourceError),
    #[error("Detection Error: {0}")]
    Detection(#[from] DetectionError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("Pipeline Error: {0}")]
    Pipeline(String),
}

// Video transport errors. Recoverable: they drive the reconnect loop and are
// never fatal to the process.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to connect to {0}: {1}")]
    Connect(String, String),
    #[error("Signaling endpoint rejected the offer with status {status}: {body}")]
    Signaling { status: u16, body: String },
    #[error("HTTP error while signaling: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to read from stream: {0}")]
    Read(#[from] std::io::Error),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Peer connection error: {0}")]
    Peer(String),
    #[error("Timed out after {0}ms waiting for the stream to connect")]
    ConnectTimeout(u64),
    #[error("Video source is not open")]
    NotOpen,
}

// Hit reporting errors. Soft failures: logged, never propagated into gameplay.
#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("HTTP error while reporting hit: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Scoring service responded with status {0}")]
    Status(u16),
    #[error("Hit report timed out")]
    Timeout,
    #[error("Report queue is full, dropping report for {0}")]
    QueueFull(String),
    #[error("Report dispatcher is closed")]
    Closed,
    #[error("Reporter failed: {0}")]
    Service(String),
}

// Model-call failures. Contained at the detector boundary, where they degrade
// to "no detections this tick".
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Hand pose provider failed: {0}")]
    HandPose(String),
    #[error("Person detector failed: {0}")]
    Person(String),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Failed to create snapshot directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("Failed to write shot image {0}: {1}")]
    WriteImage(String, image::ImageError),
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
