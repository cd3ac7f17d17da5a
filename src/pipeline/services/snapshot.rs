use std::path::{Path, PathBuf};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::common::Frame;
use crate::error::ResourceError;
use crate::pipeline::types::{HitEvent, HitVerdict};

/// Writes the frame a shot was fired on to disk as a PNG.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    directory: PathBuf,
}

impl SnapshotWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_name(frame: &Frame, event: &HitEvent) -> String {
        let verdict = match event.verdict {
            HitVerdict::Hit => "hit",
            HitVerdict::WrongTeam => "wrong_team",
            HitVerdict::Unclassified => "unclassified",
            HitVerdict::Miss => "miss",
        };
        format!(
            "shot_{}_{}_{}.png",
            event.timestamp.format("%Y%m%d_%H%M%S%.3f"),
            verdict,
            frame.frame_id().simple()
        )
    }

    /// Encodes and writes on the blocking pool.
    pub async fn save(&self, frame: &Frame, event: &HitEvent) -> Result<PathBuf, ResourceError> {
        let directory = self.directory.clone();
        let path = directory.join(Self::file_name(frame, event));
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&directory)
                .map_err(|e| ResourceError::CreateDir(directory.display().to_string(), e))?;
            frame
                .image()
                .save(&path)
                .map_err(|e| ResourceError::WriteImage(path.display().to_string(), e))?;
            Ok(path)
        })
        .await?
    }

    /// Fire-and-forget [`save`](Self::save); failures are only logged.
    pub fn spawn_save(&self, frame: &Frame, event: &HitEvent) -> JoinHandle<()> {
        let writer = self.clone();
        let frame = frame.clone();
        let event = event.clone();
        tokio::spawn(async move {
            match writer.save(&frame, &event).await {
                Ok(path) => info!("Saved shot image {}", path.display()),
                Err(e) => warn!("Failed to save shot image: {}", e),
            }
        })
    }
}
