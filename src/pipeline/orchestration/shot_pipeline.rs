use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::frame_context::{FrameContext, FrameMetrics, ProcessingStepType};
use super::kill_streak::KillStreak;
use crate::common::Frame;
use crate::config::{Configuration, PlayerConfig};
use crate::error::StreamError;
use crate::intake::VideoSource;
use crate::pipeline::services::gesture::{aim_ray, is_finger_gun, AimRay};
use crate::pipeline::services::image::TeamClassifier;
use crate::pipeline::services::reporting::report_for;
use crate::pipeline::services::{
    EventPublisher, GestureEvent, GestureTracker, HandPoseProvider, HandSelector, HitValidator,
    PersonDetector, PipelineEvent, ReportDispatcher, SnapshotWriter,
};
use crate::pipeline::types::{HandKeyStrategy, HandLandmark, HitEvent, PersonDetection, TeamNames};

/// What one tick produced.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Index of the selected hand in the provider's output.
    pub selected_hand: Option<usize>,
    pub aim: Option<AimRay>,
    /// `None` when the selected hand was not holding a finger gun.
    pub gesture: Option<GestureEvent>,
    pub hit: Option<HitEvent>,
    /// Person detections, if this tick ran the detector.
    pub persons: Option<Vec<PersonDetection>>,
    pub metrics: FrameMetrics,
}

/// The per-frame control flow: hands, active hand, pose, gesture, and on a
/// shot, validation, streak and reporting.
///
/// All per-hand and streak state lives here and is only touched from
/// [`process_frame`](Self::process_frame). Reporting and snapshots are handed
/// to background tasks.
pub struct ShotPipeline {
    shooter: PlayerConfig,
    teams: TeamNames,
    hand_key: HandKeyStrategy,
    thumb_offset_threshold: f32,
    detect_persons_every_frame: bool,
    hands: Box<dyn HandPoseProvider>,
    persons: Box<dyn PersonDetector>,
    selector: HandSelector,
    tracker: GestureTracker,
    validator: HitValidator,
    streak: KillStreak,
    events: EventPublisher,
    reporter: Option<ReportDispatcher>,
    snapshots: Option<SnapshotWriter>,
}

impl ShotPipeline {
    pub fn new(
        configuration: &Configuration,
        hands: Box<dyn HandPoseProvider>,
        persons: Box<dyn PersonDetector>,
    ) -> Self {
        let player = &configuration.player;
        Self {
            shooter: player.clone(),
            teams: configuration.teams.clone(),
            hand_key: configuration.gesture.hand_key,
            thumb_offset_threshold: configuration.gesture.thumb_offset_threshold,
            detect_persons_every_frame: configuration.pipeline.detect_persons_every_frame,
            hands,
            persons,
            selector: HandSelector::new(&configuration.hand_selection),
            tracker: GestureTracker::new(&configuration.gesture),
            validator: HitValidator::new(
                player.username.clone(),
                &configuration.hit_validation,
                TeamClassifier::new(configuration.team_classifier.clone()),
            ),
            streak: KillStreak::new(),
            events: EventPublisher::new(configuration.pipeline.event_buffer_size),
            reporter: None,
            snapshots: None,
        }
    }

    pub fn with_reporter(mut self, reporter: ReportDispatcher) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotWriter) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn streak(&self) -> KillStreak {
        self.streak
    }

    pub fn tracker(&self) -> &GestureTracker {
        &self.tracker
    }

    /// Runs one tick on `frame`. `now` is the wall-clock time the gesture
    /// cooldown is measured against.
    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> TickOutcome {
        let mut ctx = FrameContext::new(frame.clone());
        let mut outcome = TickOutcome::default();

        let started = Instant::now();
        let hands = self.hands.detect(frame).unwrap_or_else(|e| {
            warn!("Hand detection failed on frame {}: {}", frame.frame_id(), e);
            Vec::new()
        });
        ctx.metrics_mut().record_duration(
            ProcessingStepType::HandDetection,
            started.elapsed().as_micros() as u64,
        );

        if self.detect_persons_every_frame {
            ctx.persons(self.persons.as_mut());
        }

        if let Some(selected) = self.selector.select(&hands) {
            outcome.selected_hand = Some(selected.index);
            let hand = selected.observation;

            if is_finger_gun(hand, self.thumb_offset_threshold) {
                let aim = aim_ray(hand, frame.width(), frame.height());
                outcome.aim = Some(aim);
                self.events.publish(PipelineEvent::Aiming {
                    tip: aim.origin,
                    direction: aim.direction,
                });

                let thumb_y = hand.landmark(HandLandmark::ThumbTip).y;
                let gesture = self.tracker.update(hand.key(self.hand_key), thumb_y, now);
                outcome.gesture = Some(gesture);

                match gesture {
                    GestureEvent::Cocked => self.events.publish(PipelineEvent::Cocked),
                    GestureEvent::Fired => {
                        self.events.publish(PipelineEvent::Shot);
                        let hand_box = selected
                            .bbox
                            .scale(frame.width() as f32, frame.height() as f32);
                        let validation_started = Instant::now();
                        let persons = ctx.persons(self.persons.as_mut());
                        let event =
                            self.validator
                                .validate(frame, persons, &hand_box, self.shooter.team);
                        ctx.metrics_mut().record_duration(
                            ProcessingStepType::Validation,
                            validation_started.elapsed().as_micros() as u64,
                        );
                        self.record_shot(frame, &event);
                        outcome.hit = Some(event);
                    }
                    GestureEvent::FireSuppressed { remaining } => {
                        debug!("Shot suppressed, {:?} of cooldown left", remaining);
                    }
                    GestureEvent::Initialized | GestureEvent::Steady => {}
                }
            }
        }

        let (persons, metrics) = ctx.finish();
        outcome.persons = persons;
        outcome.metrics = metrics;
        outcome
    }

    fn record_shot(&mut self, frame: &Frame, event: &HitEvent) {
        let streak = self.streak.record(event.valid);

        if let Some(snapshots) = &self.snapshots {
            snapshots.spawn_save(frame, event);
        }

        match (event.valid, event.target_team) {
            (true, Some(target_team)) => {
                info!(
                    "{} hit {} (streak {})",
                    self.shooter.username,
                    self.teams.name(target_team),
                    streak
                );
                self.events.publish(PipelineEvent::Hit {
                    target_team,
                    streak,
                });
                if let (Some(reporter), Some(report)) =
                    (&self.reporter, report_for(event, &self.teams))
                {
                    if let Err(e) = reporter.dispatch(report) {
                        warn!("Hit not reported: {}", e);
                    }
                }
            }
            _ => {
                info!(
                    "{} shot without a valid hit ({:?}), streak reset",
                    self.shooter.username, event.verdict
                );
                self.events.publish(PipelineEvent::Miss {
                    event: event.clone(),
                });
            }
        }
    }

    /// Pulls frames from `source` until `cancel` fires or the source closes,
    /// then closes the source and drains pending reports.
    pub async fn run(mut self, mut source: VideoSource, cancel: CancellationToken) {
        let mut stream_state = source.subscribe_state();
        self.events.publish(PipelineEvent::StreamState {
            state: *stream_state.borrow_and_update(),
        });

        loop {
            if stream_state.has_changed().unwrap_or(false) {
                let state = *stream_state.borrow_and_update();
                self.events.publish(PipelineEvent::StreamState { state });
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = source.read() => read,
            };
            match read {
                Ok(Some(frame)) => {
                    let frame_id = frame.frame_id();
                    match self.process_off_thread(frame).await {
                        Ok((pipeline, outcome)) => {
                            self = pipeline;
                            debug!(
                                "Frame {} processed in {}us",
                                frame_id, outcome.metrics.total_processing_duration_us
                            );
                        }
                        Err(e) => {
                            error!("Frame processing task failed: {}", e);
                            source.close().await;
                            return;
                        }
                    }
                }
                // no fresh frame this tick
                Ok(None) => {}
                Err(StreamError::NotOpen) => {
                    warn!("Video source is not open, stopping pipeline");
                    break;
                }
                Err(e) => error!("Video source read failed: {}", e),
            }
        }

        source.close().await;
        self.shutdown().await;
    }

    /// Runs [`process_frame`](Self::process_frame) on the blocking pool so
    /// model inference does not stall the stream and reporting tasks.
    async fn process_off_thread(
        self,
        frame: Frame,
    ) -> Result<(Self, TickOutcome), tokio::task::JoinError> {
        tokio::task::spawn_blocking(move || {
            let mut pipeline = self;
            let outcome = pipeline.process_frame(&frame, Instant::now());
            (pipeline, outcome)
        })
        .await
    }

    /// Waits for queued hit reports to be sent.
    pub async fn shutdown(self) {
        if let Some(reporter) = self.reporter {
            reporter.shutdown().await;
        }
        info!(
            "Pipeline for {} stopped, best streak {}",
            self.shooter.username,
            self.streak.best()
        );
    }
}
