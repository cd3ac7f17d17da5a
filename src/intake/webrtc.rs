use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::intake::session::{FrameSink, StreamConnector, StreamSession};

/// Connection states reported by the peer connection's state callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PeerState::Disconnected | PeerState::Failed | PeerState::Closed
        )
    }
}

#[derive(Debug)]
pub enum PeerEvent {
    State(PeerState),
    /// A decoded frame from the remote video track.
    Frame(RgbImage),
}

/// A receive-only WebRTC peer connection. The media engine (ICE agent,
/// DTLS/SRTP, codec decode) lives behind this trait.
#[async_trait]
pub trait PeerConnection: Send {
    /// Adds a receive-only video transceiver and sets the local offer.
    async fn create_offer(&mut self) -> Result<(), StreamError>;

    /// Resolves once ICE gathering reports complete, with the local
    /// description including every gathered candidate.
    async fn gathered_offer(&mut self) -> Result<String, StreamError>;

    async fn set_answer(&mut self, sdp: String) -> Result<(), StreamError>;

    /// Next state change or frame; `None` once the connection is gone.
    async fn next_event(&mut self) -> Option<PeerEvent>;

    async fn close(&mut self);
}

pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, ice_servers: &[String]) -> Result<Box<dyn PeerConnection>, StreamError>;
}

/// POSTs the offer to the signaling endpoint and returns the answer SDP.
/// Any 200 or 201 response is accepted.
pub async fn exchange_sdp(
    client: &reqwest::Client,
    url: &str,
    offer: String,
) -> Result<String, StreamError> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/sdp")
        .body(offer)
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Err(StreamError::Signaling {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

pub struct WebRtcConnector {
    url: String,
    ice_servers: Vec<String>,
    connect_timeout: Duration,
    factory: Arc<dyn PeerConnectionFactory>,
    client: reqwest::Client,
}

impl WebRtcConnector {
    pub fn new(
        url: impl Into<String>,
        ice_servers: Vec<String>,
        connect_timeout: Duration,
        factory: Arc<dyn PeerConnectionFactory>,
    ) -> Self {
        Self {
            url: url.into(),
            ice_servers,
            connect_timeout,
            factory,
            client: reqwest::Client::new(),
        }
    }

    async fn negotiate(
        &self,
        peer: &mut Box<dyn PeerConnection>,
        sink: &FrameSink,
    ) -> Result<(), StreamError> {
        peer.create_offer().await?;
        let offer = peer.gathered_offer().await?;
        debug!("ICE gathering complete, posting offer to {}", self.url);
        let answer = exchange_sdp(&self.client, &self.url, offer).await?;
        peer.set_answer(answer).await?;

        loop {
            match peer.next_event().await {
                Some(PeerEvent::State(PeerState::Connected)) => return Ok(()),
                Some(PeerEvent::State(state)) if state.is_terminal() => {
                    return Err(StreamError::Peer(format!(
                        "connection {:?} before it was established",
                        state
                    )));
                }
                Some(PeerEvent::State(state)) => debug!("Peer connection state {:?}", state),
                Some(PeerEvent::Frame(image)) => sink.push(image),
                None => {
                    return Err(StreamError::Peer(
                        "connection ended during negotiation".to_string(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl StreamConnector for WebRtcConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self, sink: FrameSink) -> Result<StreamSession, StreamError> {
        let mut peer = self.factory.create(&self.ice_servers)?;
        let negotiated =
            tokio::time::timeout(self.connect_timeout, self.negotiate(&mut peer, &sink)).await;
        let failure = match negotiated {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(StreamError::ConnectTimeout(
                self.connect_timeout.as_millis() as u64,
            )),
        };
        if let Some(e) = failure {
            peer.close().await;
            return Err(e);
        }

        let session_id = sink.session_id();
        info!("WebRTC session {} connected via {}", session_id, self.url);
        Ok(StreamSession::spawn(session_id, move |cancel| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session {} cancelled", session_id);
                        break;
                    }
                    event = peer.next_event() => match event {
                        Some(PeerEvent::Frame(image)) => sink.push(image),
                        Some(PeerEvent::State(state)) if state.is_terminal() => {
                            warn!("WebRTC session {} went {:?}", session_id, state);
                            break;
                        }
                        Some(PeerEvent::State(state)) => {
                            debug!("WebRTC session {} state {:?}", session_id, state);
                        }
                        None => break,
                    }
                }
            }
            peer.close().await;
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::FrameQueue;
    use image::Rgb;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use uuid::Uuid;

    /// Answers one HTTP request with `status` and `body`, handing back the
    /// request it received.
    async fn signaling_server(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/whep", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/sdp\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn created_response_carries_answer() {
        let (url, server) = signaling_server("201 Created", "v=0 answer").await;
        let answer = exchange_sdp(&reqwest::Client::new(), &url, "v=0 offer".to_string())
            .await
            .unwrap();
        assert_eq!(answer, "v=0 answer");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /whep"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/sdp"));
        assert!(request.ends_with("v=0 offer"));
    }

    #[tokio::test]
    async fn rejected_offer_is_a_signaling_error() {
        let (url, _server) = signaling_server("400 Bad Request", "bad offer").await;
        let result = exchange_sdp(&reqwest::Client::new(), &url, "v=0".to_string()).await;
        match result {
            Err(StreamError::Signaling { status, body }) => {
                assert_eq!(status, 400);
                assert_eq!(body, "bad offer");
            }
            other => panic!("expected signaling error, got {:?}", other),
        }
    }

    struct ScriptedPeer {
        events: VecDeque<PeerEvent>,
        answer: Arc<Mutex<Option<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PeerConnection for ScriptedPeer {
        async fn create_offer(&mut self) -> Result<(), StreamError> {
            Ok(())
        }

        async fn gathered_offer(&mut self) -> Result<String, StreamError> {
            Ok("v=0 offer".to_string())
        }

        async fn set_answer(&mut self, sdp: String) -> Result<(), StreamError> {
            *self.answer.lock().unwrap() = Some(sdp);
            Ok(())
        }

        async fn next_event(&mut self) -> Option<PeerEvent> {
            match self.events.pop_front() {
                Some(event) => Some(event),
                // stay connected until closed
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedFactory {
        events: Mutex<Option<VecDeque<PeerEvent>>>,
        answer: Arc<Mutex<Option<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedFactory {
        fn new(events: Vec<PeerEvent>) -> Self {
            Self {
                events: Mutex::new(Some(events.into())),
                answer: Arc::new(Mutex::new(None)),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl PeerConnectionFactory for ScriptedFactory {
        fn create(&self, _ice: &[String]) -> Result<Box<dyn PeerConnection>, StreamError> {
            Ok(Box::new(ScriptedPeer {
                events: self.events.lock().unwrap().take().unwrap_or_default(),
                answer: self.answer.clone(),
                closed: self.closed.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn connect_negotiates_and_pumps_frames() {
        let (url, _server) = signaling_server("200 OK", "v=0 answer").await;
        let factory = Arc::new(ScriptedFactory::new(vec![
            PeerEvent::State(PeerState::Connecting),
            PeerEvent::State(PeerState::Connected),
            PeerEvent::Frame(RgbImage::from_pixel(2, 2, Rgb([0, 0, 9]))),
        ]));
        let connector =
            WebRtcConnector::new(url, Vec::new(), Duration::from_secs(5), factory.clone());

        let queue = FrameQueue::new(2);
        let session = connector
            .connect(FrameSink::new(Uuid::new_v4(), queue.clone()))
            .await
            .unwrap();
        assert_eq!(
            factory.answer.lock().unwrap().as_deref(),
            Some("v=0 answer")
        );

        let frame = queue.pop_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([0, 0, 9]));

        session.close().await;
        assert!(factory.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_state_during_negotiation_closes_peer() {
        let (url, _server) = signaling_server("201 Created", "v=0 answer").await;
        let factory = Arc::new(ScriptedFactory::new(vec![PeerEvent::State(
            PeerState::Failed,
        )]));
        let connector =
            WebRtcConnector::new(url, Vec::new(), Duration::from_secs(5), factory.clone());

        let result = connector
            .connect(FrameSink::new(Uuid::new_v4(), FrameQueue::new(2)))
            .await;
        assert!(matches!(result, Err(StreamError::Peer(_))));
        assert!(factory.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn negotiation_times_out() {
        let (url, _server) = signaling_server("201 Created", "v=0 answer").await;
        // never reports Connected
        let factory = Arc::new(ScriptedFactory::new(Vec::new()));
        let connector =
            WebRtcConnector::new(url, Vec::new(), Duration::from_millis(200), factory.clone());

        let result = connector
            .connect(FrameSink::new(Uuid::new_v4(), FrameQueue::new(2)))
            .await;
        assert!(matches!(result, Err(StreamError::ConnectTimeout(200))));
        assert!(factory.closed.load(Ordering::SeqCst));
    }
}
