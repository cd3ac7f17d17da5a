use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::GestureConfig;
use crate::pipeline::types::HandKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Cocked,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    pub phase: GesturePhase,
    pub last_thumb_y: f32,
    pub last_shot_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    /// First sighting of this hand; its baseline thumb position was recorded.
    Initialized,
    /// No transition this frame.
    Steady,
    /// Thumb pulled up past the threshold while idle.
    Cocked,
    /// Thumb dropped while cocked and the cooldown had elapsed.
    Fired,
    /// Thumb dropped while cocked but the hand is still cooling down.
    FireSuppressed { remaining: Duration },
}

/// Cock/fire state machine, one state per hand key.
///
/// Time is passed in by the caller so the cooldown is measured on the wall
/// clock and does not depend on how often frames arrive.
pub struct GestureTracker {
    states: HashMap<HandKey, GestureState>,
    cock_threshold: f32,
    cooldown: Duration,
}

impl GestureTracker {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            states: HashMap::new(),
            cock_threshold: config.cock_threshold,
            cooldown: config.shot_cooldown(),
        }
    }

    pub fn update(&mut self, key: HandKey, thumb_y: f32, now: Instant) -> GestureEvent {
        let Some(state) = self.states.get_mut(&key) else {
            debug!("Tracking new hand {:?}", key);
            self.states.insert(
                key,
                GestureState {
                    phase: GesturePhase::Idle,
                    last_thumb_y: thumb_y,
                    last_shot_at: None,
                },
            );
            return GestureEvent::Initialized;
        };

        // y grows downward: negative movement is the thumb rising
        let movement = thumb_y - state.last_thumb_y;
        state.last_thumb_y = thumb_y;

        match state.phase {
            GesturePhase::Idle if movement < -self.cock_threshold => {
                state.phase = GesturePhase::Cocked;
                debug!("Hand {:?} cocked", key);
                GestureEvent::Cocked
            }
            GesturePhase::Cocked if movement > self.cock_threshold => {
                state.phase = GesturePhase::Idle;
                let since_last = state
                    .last_shot_at
                    .map(|at| now.saturating_duration_since(at));
                match since_last {
                    Some(elapsed) if elapsed < self.cooldown => {
                        debug!("Hand {:?} fired during cooldown", key);
                        GestureEvent::FireSuppressed {
                            remaining: self.cooldown - elapsed,
                        }
                    }
                    _ => {
                        state.last_shot_at = Some(now);
                        info!("Hand {:?} fired", key);
                        GestureEvent::Fired
                    }
                }
            }
            _ => GestureEvent::Steady,
        }
    }

    pub fn state(&self, key: &HandKey) -> Option<&GestureState> {
        self.states.get(key)
    }

    pub fn tracked_hands(&self) -> usize {
        self.states.len()
    }
}
