pub mod ffmpeg;
pub mod frame_queue;
pub mod session;
pub mod source;
pub mod tcp;
pub mod webrtc;

pub use ffmpeg::FfmpegConnector;
pub use frame_queue::FrameQueue;
pub use session::{FrameSink, StreamConnectionState, StreamConnector, StreamSession};
pub use source::VideoSource;
pub use tcp::{FramedReader, TcpFrameConnector, WireFrame};
pub use webrtc::{PeerConnection, PeerConnectionFactory, PeerEvent, PeerState, WebRtcConnector};
