use serde::Serialize;
use tokio::sync::broadcast;

use crate::common::Point;
use crate::intake::StreamConnectionState;
use crate::pipeline::types::{HitEvent, TeamLabel};

/// Notifications for HUD and sound consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A finger gun is held up; `tip` and `direction` are in frame pixels.
    Aiming { tip: Point, direction: (f32, f32) },
    Cocked,
    /// A firing motion that passed the cooldown.
    Shot,
    Hit { target_team: TeamLabel, streak: u32 },
    Miss { event: HitEvent },
    StreamState { state: StreamConnectionState },
}

/// Fans pipeline events out over a broadcast channel. Publishing never waits
/// and having no subscribers is fine; slow subscribers lose the oldest
/// events.
#[derive(Clone)]
pub struct EventPublisher {
    event_tx: broadcast::Sender<PipelineEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}
