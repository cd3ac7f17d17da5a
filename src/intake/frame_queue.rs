use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::warn;

use crate::common::Frame;

struct Inner {
    frames: Mutex<VecDeque<Frame>>,
    available: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

/// Bounded hand-off between a stream session and the frame loop.
///
/// `push` never waits: when the queue is full the oldest frame is evicted so
/// the consumer always sees the freshest picture. Clones share the same
/// buffer.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<Inner>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                frames: Mutex::new(VecDeque::with_capacity(capacity)),
                available: Notify::new(),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // a panicking holder cannot leave the deque half-updated
        self.inner
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueues `frame`, returning the evicted frame if the queue was full.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let evicted = {
            let mut frames = self.frames();
            let evicted = if frames.len() >= self.inner.capacity {
                frames.pop_front()
            } else {
                None
            };
            frames.push_back(frame);
            evicted
        };
        if let Some(old) = &evicted {
            let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Frame queue full, dropped frame {} ({} dropped so far)",
                old.frame_id(),
                total
            );
        }
        self.inner.available.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<Frame> {
        self.frames().pop_front()
    }

    /// Waits up to `timeout` for a frame.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let wait = async {
            loop {
                let notified = self.inner.available.notified();
                if let Some(frame) = self.try_pop() {
                    return frame;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    pub fn clear(&self) {
        self.frames().clear();
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
