use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::util::BoxService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::{debug, info, warn};

use crate::error::ReportingError;
use crate::pipeline::types::{HitEvent, HitReport, TeamNames};

pub type HitReporter = BoxService<HitReport, (), BoxError>;

/// Builds the wire report for a valid hit; `None` for anything else.
pub fn report_for(event: &HitEvent, teams: &TeamNames) -> Option<HitReport> {
    if !event.valid {
        return None;
    }
    let team = event.target_team?;
    Some(HitReport {
        hitter_username: event.shooter_id.clone(),
        target_team: teams.name(team),
    })
}

/// POSTs hit reports as JSON to the scoring service.
#[derive(Clone)]
pub struct HttpHitReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpHitReporter {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// The reporter wrapped in a timeout bounding each request.
    pub fn with_timeout(self, timeout: Duration) -> HitReporter {
        BoxService::new(
            ServiceBuilder::new()
                .layer(TimeoutLayer::new(timeout))
                .service(self),
        )
    }
}

impl Service<HitReport> for HttpHitReporter {
    type Response = ();
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, report: HitReport) -> Self::Future {
        let request = self.client.post(&self.endpoint).json(&report);
        Box::pin(async move {
            let response = request.send().await.map_err(ReportingError::Http)?;
            let status = response.status();
            if !status.is_success() {
                return Err(ReportingError::Status(status.as_u16()).into());
            }
            Ok::<(), BoxError>(())
        })
    }
}

fn classify(error: BoxError) -> ReportingError {
    if error.is::<Elapsed>() {
        return ReportingError::Timeout;
    }
    match error.downcast::<ReportingError>() {
        Ok(reporting) => *reporting,
        Err(other) => ReportingError::Service(other.to_string()),
    }
}

/// Sends hit reports from a background task so the frame loop never waits
/// on the network. Failures are logged and dropped.
pub struct ReportDispatcher {
    report_tx: mpsc::Sender<HitReport>,
    task: JoinHandle<()>,
}

impl ReportDispatcher {
    pub fn spawn(mut reporter: HitReporter, capacity: usize) -> Self {
        let (report_tx, mut report_rx) = mpsc::channel::<HitReport>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                let hitter = report.hitter_username.clone();
                let result = match reporter.ready().await {
                    Ok(service) => service.call(report).await,
                    Err(e) => Err(e),
                };
                match result.map_err(classify) {
                    Ok(()) => info!("Reported hit by {}", hitter),
                    Err(e) => warn!("Failed to report hit by {}: {}", hitter, e),
                }
            }
            debug!("Report dispatcher drained");
        });
        Self { report_tx, task }
    }

    /// Queues `report` without waiting.
    pub fn dispatch(&self, report: HitReport) -> Result<(), ReportingError> {
        self.report_tx.try_send(report).map_err(|e| match e {
            mpsc::error::TrySendError::Full(report) => {
                ReportingError::QueueFull(report.hitter_username)
            }
            mpsc::error::TrySendError::Closed(_) => ReportingError::Closed,
        })
    }

    /// Stops accepting reports and waits for queued ones to finish.
    pub async fn shutdown(self) {
        let Self { report_tx, task } = self;
        drop(report_tx);
        if let Err(e) = task.await {
            warn!("Report dispatcher task failed: {}", e);
        }
    }
}
