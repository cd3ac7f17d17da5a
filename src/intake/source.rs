use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::Frame;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::intake::session::{FrameSink, StreamConnectionState, StreamConnector, StreamSession};
use crate::intake::FrameQueue;

/// Live frames from a network stream, with reconnect handling.
///
/// Frames are produced by a [`StreamSession`] on its own task and handed
/// over through a drop-oldest [`FrameQueue`]. After `failure_threshold`
/// consecutive reads without a frame the session is torn down and a
/// background task retries the connector every `reconnect_interval` until it
/// succeeds or the source is closed. [`is_open`](Self::is_open) is false for
/// the whole gap.
pub struct VideoSource {
    connector: Arc<dyn StreamConnector>,
    config: StreamConfig,
    queue: FrameQueue,
    state: Arc<watch::Sender<StreamConnectionState>>,
    session: Option<StreamSession>,
    reconnect: Option<JoinHandle<Option<StreamSession>>>,
    cancel: CancellationToken,
    consecutive_failures: u32,
}

impl VideoSource {
    pub fn new(connector: Arc<dyn StreamConnector>, config: StreamConfig) -> Self {
        let (state, _) = watch::channel(StreamConnectionState::Disconnected);
        Self {
            connector,
            queue: FrameQueue::new(config.queue_capacity),
            config,
            state: Arc::new(state),
            session: None,
            reconnect: None,
            cancel: CancellationToken::new(),
            consecutive_failures: 0,
        }
    }

    /// Connects, retrying up to `max_connect_attempts` times at the
    /// reconnect interval.
    pub async fn open(&mut self) -> Result<(), StreamError> {
        if self.state() != StreamConnectionState::Disconnected {
            return Ok(());
        }
        self.cancel = CancellationToken::new();
        self.set_state(StreamConnectionState::Connecting);

        let attempts = self.config.max_connect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.connector.connect(self.new_sink()).await {
                Ok(session) => {
                    info!(
                        "Video source connected to {} on attempt {}",
                        self.connector.endpoint(),
                        attempt
                    );
                    self.install(session);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Connect attempt {}/{} to {} failed: {}",
                        attempt,
                        attempts,
                        self.connector.endpoint(),
                        e
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.reconnect_interval()).await;
            }
        }

        self.set_state(StreamConnectionState::Disconnected);
        Err(StreamError::Connect(
            self.connector.endpoint().to_string(),
            last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string()),
        ))
    }

    /// Waits up to the read timeout for the next frame.
    ///
    /// `Ok(None)` means no fresh frame arrived in time; while connected that
    /// counts as a failed read. Fails only when the source is not open.
    pub async fn read(&mut self) -> Result<Option<Frame>, StreamError> {
        self.collect_reconnect().await;
        if self.state() == StreamConnectionState::Reconnecting && self.reconnect.is_none() {
            // a teardown interrupted by a dropped read
            self.finish_teardown().await;
        }

        match self.state() {
            StreamConnectionState::Disconnected => return Err(StreamError::NotOpen),
            StreamConnectionState::Connected => {}
            StreamConnectionState::Connecting | StreamConnectionState::Reconnecting => {
                let frame = self.queue.pop_timeout(self.config.read_timeout()).await;
                return Ok(frame);
            }
        }

        match self.queue.pop_timeout(self.config.read_timeout()).await {
            Some(frame) => {
                self.consecutive_failures = 0;
                Ok(Some(frame))
            }
            None => {
                self.consecutive_failures += 1;
                debug!(
                    "No frame within {:?} ({} consecutive)",
                    self.config.read_timeout(),
                    self.consecutive_failures
                );
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.begin_reconnect().await;
                }
                Ok(None)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == StreamConnectionState::Connected
    }

    pub fn state(&self) -> StreamConnectionState {
        *self.state.borrow()
    }

    /// Connection state changes, for consumers that surface them to a HUD.
    pub fn subscribe_state(&self) -> watch::Receiver<StreamConnectionState> {
        self.state.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    /// Stops any reconnect loop and closes the session, waiting for its
    /// transport to be released.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(reconnect) = self.reconnect.take() {
            match reconnect.await {
                Ok(Some(session)) => session.close().await,
                Ok(None) => {}
                Err(e) => error!("Reconnect task failed: {}", e),
            }
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.queue.clear();
        self.consecutive_failures = 0;
        self.set_state(StreamConnectionState::Disconnected);
        info!("Video source for {} closed", self.connector.endpoint());
    }

    fn new_sink(&self) -> FrameSink {
        FrameSink::new(Uuid::new_v4(), self.queue.clone())
    }

    fn install(&mut self, session: StreamSession) {
        debug!("Installing stream session {}", session.id());
        self.session = Some(session);
        self.consecutive_failures = 0;
        self.set_state(StreamConnectionState::Connected);
    }

    fn set_state(&self, next: StreamConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug!("Stream state {} -> {}", current, next);
            *current = next;
            true
        });
    }

    async fn begin_reconnect(&mut self) {
        warn!(
            "{} consecutive failed reads from {}, reconnecting",
            self.consecutive_failures,
            self.connector.endpoint()
        );
        self.set_state(StreamConnectionState::Reconnecting);
        self.finish_teardown().await;
    }

    /// Releases the old session and starts the reconnect loop. The session
    /// stays in `self` until its transport is released, so dropping this
    /// future midway leaves it for `close` or the next `read`.
    async fn finish_teardown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.shutdown().await;
        }
        self.session = None;
        self.queue.clear();
        self.consecutive_failures = 0;

        let connector = self.connector.clone();
        let queue = self.queue.clone();
        let interval = self.config.reconnect_interval();
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        self.reconnect = Some(tokio::spawn(async move {
            let mut attempt = 0u64;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(interval) => {}
                }
                attempt += 1;
                let sink = FrameSink::new(Uuid::new_v4(), queue.clone());
                let connected = tokio::select! {
                    _ = cancel.cancelled() => return None,
                    result = connector.connect(sink) => result,
                };
                match connected {
                    Ok(session) => {
                        info!(
                            "Reconnected to {} after {} attempts",
                            connector.endpoint(),
                            attempt
                        );
                        state.send_replace(StreamConnectionState::Connected);
                        return Some(session);
                    }
                    Err(e) => warn!(
                        "Reconnect attempt {} to {} failed: {}",
                        attempt,
                        connector.endpoint(),
                        e
                    ),
                }
            }
        }));
    }

    /// Picks up the session of a finished reconnect loop.
    async fn collect_reconnect(&mut self) {
        if !self
            .reconnect
            .as_ref()
            .is_some_and(|handle| handle.is_finished())
        {
            return;
        }
        let Some(handle) = self.reconnect.take() else {
            return;
        };
        match handle.await {
            Ok(Some(session)) => self.install(session),
            Ok(None) => {}
            Err(e) => {
                error!("Reconnect task failed: {}", e);
                self.set_state(StreamConnectionState::Disconnected);
            }
        }
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
