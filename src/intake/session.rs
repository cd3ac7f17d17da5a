use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::common::Frame;
use crate::error::StreamError;
use crate::intake::FrameQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for StreamConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamConnectionState::Disconnected => "disconnected",
            StreamConnectionState::Connecting => "connecting",
            StreamConnectionState::Connected => "connected",
            StreamConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Producer side of the frame queue, stamped with the session that owns it.
#[derive(Clone)]
pub struct FrameSink {
    session_id: Uuid,
    queue: FrameQueue,
}

impl FrameSink {
    pub fn new(session_id: Uuid, queue: FrameQueue) -> Self {
        Self { session_id, queue }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn push(&self, image: RgbImage) {
        self.queue
            .push(Frame::new(self.session_id, image, Utc::now()));
    }
}

/// A live transport session: one background task pumping decoded frames
/// into a [`FrameSink`] until it is cancelled or the remote end goes away.
pub struct StreamSession {
    id: Uuid,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    /// Spawns `pump` with a token that is cancelled when the session closes.
    /// The pump must release its transport before returning.
    pub fn spawn<F, Fut>(id: Uuid, pump: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(cancel.clone()));
        Self {
            id,
            cancel,
            task: Some(task),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the pump has returned on its own or after cancellation.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancels the pump and waits until it has released its transport.
    ///
    /// Cancel-safe: if this future is dropped early the pump handle stays
    /// in the session, so a later `shutdown` or `close` still waits for it.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            if let Err(e) = result {
                debug!("Stream session {} pump ended abnormally: {}", self.id, e);
            }
            debug!("Stream session {} closed", self.id);
        }
    }

    pub async fn close(mut self) {
        self.shutdown().await;
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Establishes transport sessions for the video source.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Human-readable remote address, for logs and errors.
    fn endpoint(&self) -> &str;

    async fn connect(&self, sink: FrameSink) -> Result<StreamSession, StreamError>;
}
