use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::intake::session::{FrameSink, StreamConnector, StreamSession};

const FRAME_LENGTH_BYTES: usize = 4;
const TAG_KEEP_ALIVE: u8 = 0;
const TAG_IMAGE: u8 = 2;
const TAG_END_OF_STREAM: u8 = 3;
/// Largest accepted frame side, in pixels.
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// One message of the relay protocol: `[length u32 LE][tag u8][payload]`,
/// where `length` counts the tag and payload.
#[derive(Debug)]
pub enum WireFrame {
    KeepAlive,
    /// Payload `[width u32 LE][height u32 LE][width * height * 3 RGB bytes]`.
    Image(RgbImage),
    EndOfStream,
}

enum ReadState {
    WaitingForLength,
    WaitingForFrame { expected_length: u32 },
}

pub struct FramedReader<T> {
    reader: BufReader<T>,
    max_dimension: u32,
}

impl<T: AsyncRead + Unpin + Send> FramedReader<T> {
    pub fn new(stream: T) -> Self {
        Self {
            reader: BufReader::new(stream),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Rejects images wider or taller than `max_dimension` before reading
    /// their pixels.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub async fn read(&mut self) -> Result<WireFrame, StreamError> {
        let mut state = ReadState::WaitingForLength;
        loop {
            match state {
                ReadState::WaitingForLength => {
                    state = ReadState::WaitingForFrame {
                        expected_length: self.read_frame_length().await?,
                    };
                }
                ReadState::WaitingForFrame { expected_length } => {
                    return self.read_frame_data(expected_length).await;
                }
            }
        }
    }

    async fn read_frame_length(&mut self) -> Result<u32, StreamError> {
        let mut length_buffer = [0u8; FRAME_LENGTH_BYTES];
        self.reader.read_exact(&mut length_buffer).await?;
        Ok(u32::from_le_bytes(length_buffer))
    }

    async fn read_frame_data(&mut self, expected_length: u32) -> Result<WireFrame, StreamError> {
        if expected_length == 0 {
            return Err(StreamError::InvalidFrame("empty frame".to_string()));
        }
        let tag = self.reader.read_u8().await?;
        let payload_length = expected_length as usize - 1;
        match tag {
            TAG_KEEP_ALIVE | TAG_END_OF_STREAM if payload_length != 0 => {
                Err(StreamError::InvalidFrame(format!(
                    "tag {} carries {} unexpected payload bytes",
                    tag, payload_length
                )))
            }
            TAG_KEEP_ALIVE => Ok(WireFrame::KeepAlive),
            TAG_END_OF_STREAM => Ok(WireFrame::EndOfStream),
            TAG_IMAGE => self.read_rgb_image(payload_length).await,
            other => Err(StreamError::InvalidFrame(format!("unknown tag {}", other))),
        }
    }

    async fn read_rgb_image(&mut self, payload_length: usize) -> Result<WireFrame, StreamError> {
        if payload_length < 8 {
            return Err(StreamError::InvalidFrame(format!(
                "image payload of {} bytes has no dimensions",
                payload_length
            )));
        }
        let width = self.reader.read_u32_le().await?;
        let height = self.reader.read_u32_le().await?;
        if width == 0 || height == 0 || width > self.max_dimension || height > self.max_dimension {
            return Err(StreamError::InvalidFrame(format!(
                "{}x{} image is outside 1..={} pixels per side",
                width, height, self.max_dimension
            )));
        }
        let pixel_bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .filter(|n| *n == payload_length - 8)
            .ok_or_else(|| {
                StreamError::InvalidFrame(format!(
                    "{}x{} image does not match {} payload bytes",
                    width, height, payload_length
                ))
            })?;

        let mut pixels = vec![0u8; pixel_bytes];
        self.reader.read_exact(&mut pixels).await?;
        RgbImage::from_raw(width, height, pixels)
            .map(WireFrame::Image)
            .ok_or_else(|| StreamError::InvalidFrame("pixel buffer too small".to_string()))
    }
}

/// Connects to a frame relay speaking the length-prefixed RGB protocol.
pub struct TcpFrameConnector {
    addr: String,
    connect_timeout: Duration,
    max_dimension: u32,
}

impl TcpFrameConnector {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }
}

#[async_trait]
impl StreamConnector for TcpFrameConnector {
    fn endpoint(&self) -> &str {
        &self.addr
    }

    async fn connect(&self, sink: FrameSink) -> Result<StreamSession, StreamError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| StreamError::ConnectTimeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| StreamError::Connect(self.addr.clone(), e.to_string()))?;
        stream.set_nodelay(true)?;

        let session_id = sink.session_id();
        info!("Connected to frame relay {} (session {})", self.addr, session_id);
        let mut reader = FramedReader::new(stream).with_max_dimension(self.max_dimension);
        Ok(StreamSession::spawn(session_id, move |cancel| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session {} cancelled", session_id);
                        break;
                    }
                    frame = reader.read() => match frame {
                        Ok(WireFrame::Image(image)) => sink.push(image),
                        Ok(WireFrame::KeepAlive) => {}
                        Ok(WireFrame::EndOfStream) => {
                            info!("Frame relay ended session {}", session_id);
                            break;
                        }
                        Err(e) => {
                            warn!("Session {} read failed: {}", session_id, e);
                            break;
                        }
                    }
                }
            }
        }))
    }
}

/// Encodes a message in the relay protocol. Used by relays and tests.
pub fn encode(frame: &WireFrame) -> Vec<u8> {
    let (tag, payload) = match frame {
        WireFrame::KeepAlive => (TAG_KEEP_ALIVE, Vec::new()),
        WireFrame::EndOfStream => (TAG_END_OF_STREAM, Vec::new()),
        WireFrame::Image(image) => {
            let mut payload = Vec::with_capacity(8 + image.as_raw().len());
            payload.extend_from_slice(&image.width().to_le_bytes());
            payload.extend_from_slice(&image.height().to_le_bytes());
            payload.extend_from_slice(image.as_raw());
            (TAG_IMAGE, payload)
        }
    };
    let mut out = Vec::with_capacity(FRAME_LENGTH_BYTES + 1 + payload.len());
    out.extend_from_slice(&(payload.len() as u32 + 1).to_le_bytes());
    out.push(tag);
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::FrameQueue;
    use image::Rgb;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    #[tokio::test]
    async fn reads_image_and_control_frames() {
        let image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let mut bytes = encode(&WireFrame::KeepAlive);
        bytes.extend(encode(&WireFrame::Image(image.clone())));
        bytes.extend(encode(&WireFrame::EndOfStream));

        let mut reader = FramedReader::new(bytes.as_slice());
        assert!(matches!(reader.read().await, Ok(WireFrame::KeepAlive)));
        match reader.read().await {
            Ok(WireFrame::Image(decoded)) => assert_eq!(decoded, image),
            other => panic!("expected image, got {:?}", other),
        }
        assert!(matches!(reader.read().await, Ok(WireFrame::EndOfStream)));
        assert!(matches!(reader.read().await, Err(StreamError::Read(_))));
    }

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(1u32 + 8 + 6).to_le_bytes());
        bytes.push(TAG_IMAGE);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 6]);

        let mut reader = FramedReader::new(bytes.as_slice());
        assert!(matches!(
            reader.read().await,
            Err(StreamError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_dimensions_before_allocating() {
        // header claims a 65536x65536 image but carries no pixels
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(1u32 + 8).to_le_bytes());
        bytes.push(TAG_IMAGE);
        bytes.extend_from_slice(&65_536u32.to_le_bytes());
        bytes.extend_from_slice(&65_536u32.to_le_bytes());

        let mut reader = FramedReader::new(bytes.as_slice());
        match reader.read().await {
            Err(StreamError::InvalidFrame(message)) => assert!(message.contains("4096")),
            other => panic!("expected invalid frame, got {:?}", other),
        }

        let image = RgbImage::from_pixel(8, 4, Rgb([1, 2, 3]));
        let bytes = encode(&WireFrame::Image(image));
        let mut reader = FramedReader::new(bytes.as_slice()).with_max_dimension(4);
        assert!(matches!(
            reader.read().await,
            Err(StreamError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_tag() {
        let bytes = [1u8, 0, 0, 0, 9];
        let mut reader = FramedReader::new(&bytes[..]);
        assert!(matches!(
            reader.read().await,
            Err(StreamError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn connector_pumps_frames_into_queue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let relay = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let image = RgbImage::from_pixel(2, 2, Rgb([200, 0, 0]));
            socket
                .write_all(&encode(&WireFrame::Image(image)))
                .await
                .unwrap();
            socket
                .write_all(&encode(&WireFrame::EndOfStream))
                .await
                .unwrap();
        });

        let queue = FrameQueue::new(2);
        let connector = TcpFrameConnector::new(addr, Duration::from_secs(1));
        let session_id = Uuid::new_v4();
        let session = connector
            .connect(FrameSink::new(session_id, queue.clone()))
            .await
            .unwrap();

        let frame = queue
            .pop_timeout(Duration::from_secs(5))
            .await
            .expect("frame from relay");
        assert_eq!(frame.session_id(), session_id);
        assert_eq!(frame.image().get_pixel(1, 1), &Rgb([200, 0, 0]));

        relay.await.unwrap();
        session.close().await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = TcpFrameConnector::new(addr, Duration::from_secs(1));
        let result = connector
            .connect(FrameSink::new(Uuid::new_v4(), FrameQueue::new(2)))
            .await;
        assert!(matches!(result, Err(StreamError::Connect(_, _))));
    }
}
