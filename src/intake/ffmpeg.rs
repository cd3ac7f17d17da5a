use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::intake::session::{FrameSink, StreamConnector, StreamSession};

/// Pulls a network stream (RTMP, RTSP, HLS, ...) through an `ffmpeg`
/// subprocess that decodes it to raw `rgb24` frames of a fixed size on
/// stdout.
///
/// The session counts as connected once the first full frame arrives. The
/// process is killed when the session closes, or dropped with it.
pub struct FfmpegConnector {
    url: String,
    width: u32,
    height: u32,
    connect_timeout: Duration,
    program: String,
    leading_args: Vec<String>,
}

impl FfmpegConnector {
    pub fn new(url: impl Into<String>, width: u32, height: u32, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            connect_timeout,
            program: "ffmpeg".to_string(),
            leading_args: Vec::new(),
        }
    }

    /// Runs `program` instead of `ffmpeg`, with `leading_args` placed before
    /// the decoding arguments.
    pub fn with_command(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.program = program.into();
        self.leading_args = leading_args;
        self
    }

    /// Decoding arguments: low-latency input, video only, scaled to the
    /// configured size, raw RGB to stdout.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-loglevel", "error", "-fflags", "nobuffer", "-flags", "low_delay",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if self.url.starts_with("rtsp://") {
            args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
        }
        args.extend([
            "-i".to_string(),
            self.url.clone(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", self.width, self.height),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    fn spawn(&self) -> Result<Child, StreamError> {
        Command::new(&self.program)
            .args(&self.leading_args)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                StreamError::Connect(
                    self.url.clone(),
                    format!("failed to start {}: {}", self.program, e),
                )
            })
    }
}

async fn read_frame<R: AsyncRead + Unpin>(
    stdout: &mut R,
    width: u32,
    height: u32,
) -> Result<RgbImage, StreamError> {
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    stdout.read_exact(&mut pixels).await?;
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| StreamError::InvalidFrame("short rgb24 frame".to_string()))
}

async fn stop(child: &mut Child, url: &str) {
    match child.try_wait() {
        Ok(Some(status)) => debug!("ffmpeg for {} exited with {}", url, status),
        _ => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill ffmpeg for {}: {}", url, e);
            }
        }
    }
}

#[async_trait]
impl StreamConnector for FfmpegConnector {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self, sink: FrameSink) -> Result<StreamSession, StreamError> {
        let mut child = self.spawn()?;
        let Some(mut stdout) = child.stdout.take() else {
            stop(&mut child, &self.url).await;
            return Err(StreamError::Connect(
                self.url.clone(),
                "ffmpeg stdout is not piped".to_string(),
            ));
        };

        let (width, height) = (self.width, self.height);
        let first = tokio::time::timeout(
            self.connect_timeout,
            read_frame(&mut stdout, width, height),
        )
        .await;
        let first = match first {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => {
                stop(&mut child, &self.url).await;
                return Err(StreamError::Connect(self.url.clone(), e.to_string()));
            }
            Err(_) => {
                stop(&mut child, &self.url).await;
                return Err(StreamError::ConnectTimeout(
                    self.connect_timeout.as_millis() as u64,
                ));
            }
        };
        sink.push(first);

        let session_id = sink.session_id();
        let url = self.url.clone();
        info!("ffmpeg session {} decoding {}", session_id, url);
        Ok(StreamSession::spawn(session_id, move |cancel| async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session {} cancelled", session_id);
                        break;
                    }
                    frame = read_frame(&mut stdout, width, height) => match frame {
                        Ok(image) => sink.push(image),
                        Err(e) => {
                            warn!("Session {} stream ended: {}", session_id, e);
                            break;
                        }
                    }
                }
            }
            stop(&mut child, &url).await;
        }))
    }
}
