use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::{Configuration, StreamConfig, StreamKind},
    error::{AppError, ConfigError},
    intake::{
        FfmpegConnector, PeerConnectionFactory, StreamConnector, TcpFrameConnector, VideoSource,
        WebRtcConnector,
    },
    pipeline::{
        services::{
            reporting::HitReporter, EventPublisher, HandPoseProvider, HttpHitReporter,
            PersonDetector, PipelineEvent, ReportDispatcher, SnapshotWriter,
        },
        ShotPipeline,
    },
};

/// Owns the running pipeline task. Dropping it cancels the task; use
/// [`stop`](Self::stop) to also wait for the stream to be released.
pub struct Coordinator {
    pipeline_task: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    events: EventPublisher,
}

impl Coordinator {
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.pipeline_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Cancels the pipeline and waits until the video source is closed and
    /// pending reports are flushed.
    pub async fn stop(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.pipeline_task.take() {
            if let Err(e) = task.await {
                error!("Pipeline task failed: {}", e);
            }
        }
        info!("Coordinator stopped");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Picks the transport named by `stream.kind`.
pub fn connector_for(
    stream: &StreamConfig,
    peer_factory: Option<Arc<dyn PeerConnectionFactory>>,
) -> Result<Arc<dyn StreamConnector>, ConfigError> {
    match stream.kind {
        StreamKind::Tcp => Ok(Arc::new(
            TcpFrameConnector::new(stream.url.clone(), stream.connect_timeout())
                .with_max_dimension(stream.max_frame_dimension),
        )),
        StreamKind::Ffmpeg => Ok(Arc::new(
            FfmpegConnector::new(
                stream.url.clone(),
                stream.frame_width,
                stream.frame_height,
                stream.connect_timeout(),
            )
            .with_command(stream.ffmpeg_path.clone(), Vec::new()),
        )),
        StreamKind::WebRtc => {
            let factory = peer_factory.ok_or_else(|| {
                ConfigError::Invalid(
                    "stream.kind = web_rtc needs a peer connection factory".to_string(),
                )
            })?;
            Ok(Arc::new(WebRtcConnector::new(
                stream.url.clone(),
                stream.stun_servers.clone(),
                stream.connect_timeout(),
                factory,
            )))
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    connector: Option<Arc<dyn StreamConnector>>,
    peer_factory: Option<Arc<dyn PeerConnectionFactory>>,
    hands: Option<Box<dyn HandPoseProvider>>,
    persons: Option<Box<dyn PersonDetector>>,
    reporter: Option<HitReporter>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            connector: None,
            peer_factory: None,
            hands: None,
            persons: None,
            reporter: None,
        }
    }

    // Sets the shooter's username, this will override the default configuration.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.configuration.player.username = username.into();
        self
    }

    // Sets the stream URL, this will override the default configuration.
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.configuration.stream.url = url.into();
        self
    }

    pub fn hand_pose_provider(mut self, hands: Box<dyn HandPoseProvider>) -> Self {
        self.hands = Some(hands);
        self
    }

    pub fn person_detector(mut self, persons: Box<dyn PersonDetector>) -> Self {
        self.persons = Some(persons);
        self
    }

    /// Media engine for `web_rtc` streams.
    pub fn peer_factory(mut self, factory: Arc<dyn PeerConnectionFactory>) -> Self {
        self.peer_factory = Some(factory);
        self
    }

    /// Replaces the transport chosen from `stream.kind`.
    pub fn connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the HTTP reporter built from `reporting.endpoint`.
    pub fn reporter(mut self, reporter: HitReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Opens the stream and starts the pipeline task.
    pub async fn start(self) -> Result<Coordinator, AppError> {
        let configuration = self.configuration;
        configuration.validate()?;

        let hands = self
            .hands
            .ok_or(AppError::Pipeline("Hand pose provider not set".to_string()))?;
        let persons = self
            .persons
            .ok_or(AppError::Pipeline("Person detector not set".to_string()))?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => connector_for(&configuration.stream, self.peer_factory)?,
        };

        let mut source = VideoSource::new(connector, configuration.stream.clone());
        source.open().await?;

        let mut pipeline = ShotPipeline::new(&configuration, hands, persons);
        let reporter = self.reporter.or_else(|| {
            configuration.reporting.endpoint.as_ref().map(|endpoint| {
                HttpHitReporter::new(endpoint.clone()).with_timeout(configuration.reporting.timeout())
            })
        });
        if let Some(reporter) = reporter {
            pipeline = pipeline.with_reporter(ReportDispatcher::spawn(
                reporter,
                configuration.reporting.queue_capacity,
            ));
        }
        if let Some(directory) = &configuration.snapshots.directory {
            pipeline = pipeline.with_snapshots(SnapshotWriter::new(directory.clone()));
        }

        let events = pipeline.events().clone();
        let cancel_token = CancellationToken::new();
        let pipeline_task = tokio::spawn(pipeline.run(source, cancel_token.clone()));
        info!(
            "Pipeline started for {} on {}",
            configuration.player.username, configuration.stream.url
        );

        Ok(Coordinator {
            pipeline_task: Some(pipeline_task),
            cancel_token,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BoundingBox, Frame};
    use crate::error::DetectionError;
    use crate::intake::tcp::{encode, WireFrame};
    use crate::pipeline::services::gesture::pose::tests::finger_gun;
    use crate::pipeline::types::{HandObservation, HitReport, PersonDetection, TeamLabel};
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tower::util::BoxService;
    use tower::BoxError;

    struct ScriptedHands(VecDeque<Vec<HandObservation>>);

    impl HandPoseProvider for ScriptedHands {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<HandObservation>, DetectionError> {
            Ok(self.0.pop_front().unwrap_or_default())
        }
    }

    struct OnePerson;

    impl PersonDetector for OnePerson {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<PersonDetection>, DetectionError> {
            Ok(vec![PersonDetection::new(
                BoundingBox::new(50.0, 0.0, 150.0, 200.0),
                0.9,
            )])
        }
    }

    fn lower_right(thumb_y: f32) -> HandObservation {
        let mut hand = finger_gun(thumb_y);
        for landmark in hand.landmarks.iter_mut() {
            landmark.x += 0.35;
            landmark.y += 0.3;
        }
        hand
    }

    /// Streams green frames every 20ms until the client hangs up.
    async fn relay() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let frame = encode(&WireFrame::Image(RgbImage::from_pixel(
                200,
                200,
                Rgb([30, 200, 40]),
            )));
            while socket.write_all(&frame).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn end_to_end_hit_is_reported() {
        let addr = relay().await;
        let (report_tx, mut report_rx) = mpsc::unbounded_channel::<HitReport>();
        let reporter = BoxService::new(tower::service_fn(move |report: HitReport| {
            let report_tx = report_tx.clone();
            async move {
                let _ = report_tx.send(report);
                Ok::<(), BoxError>(())
            }
        }));

        let coordinator = CoordinatorBuilder::new(Configuration::default())
            .username("tester")
            .stream_url(addr)
            .hand_pose_provider(Box::new(ScriptedHands(
                vec![
                    vec![lower_right(0.50)],
                    vec![lower_right(0.45)],
                    vec![lower_right(0.50)],
                ]
                .into(),
            )))
            .person_detector(Box::new(OnePerson))
            .reporter(reporter)
            .start()
            .await
            .expect("Failed to start coordinator");
        let mut events = coordinator.subscribe();
        assert!(coordinator.is_running());

        let hit = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(PipelineEvent::Hit { target_team, streak }) => break (target_team, streak),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event channel closed: {}", e),
                }
            }
        })
        .await
        .expect("no hit within 5s");
        assert_eq!(hit, (TeamLabel::TeamB, 1));

        coordinator.stop().await;
        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.hitter_username, "tester");
        assert_eq!(report.target_team, "green");
    }

    #[tokio::test]
    async fn start_requires_detectors() {
        let result = CoordinatorBuilder::new(Configuration::default()).start().await;
        assert!(matches!(result, Err(AppError::Pipeline(_))));
    }

    #[test]
    fn webrtc_without_media_engine_is_rejected() {
        let stream = StreamConfig {
            kind: StreamKind::WebRtc,
            ..StreamConfig::default()
        };
        assert!(matches!(
            connector_for(&stream, None),
            Err(ConfigError::Invalid(_))
        ));
        assert!(connector_for(&StreamConfig::default(), None).is_ok());
    }

    #[test]
    fn ffmpeg_kind_pulls_the_configured_url() {
        let stream = StreamConfig {
            kind: StreamKind::Ffmpeg,
            url: "rtmp://glasses.local/live/p1".to_string(),
            ..StreamConfig::default()
        };
        let connector = connector_for(&stream, None).unwrap();
        assert_eq!(connector.endpoint(), "rtmp://glasses.local/live/p1");
    }
}
