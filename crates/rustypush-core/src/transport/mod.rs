//! Wire transports.
//!
//! Two encodings are spoken:
//!
//! - **line mode**: one compact JSON document per `\n`-terminated line;
//! - **framed mode**: LSP-style `Content-Length: N\r\n\r\n` header block
//!   followed by exactly `N` body bytes.
//!
//! Stdio auto-detects the encoding per message and answers in kind. The
//! Unix socket transport speaks framed mode only.

mod framing;
#[cfg(unix)]
pub mod socket;
pub mod stdio;

pub use framing::{Detection, FrameReader, write_frame};
#[cfg(unix)]
pub use socket::{SocketGuard, bind_socket, default_socket_path, serve_socket};
pub use stdio::{serve_connection, serve_stdio};

/// Largest accepted frame body (10 MiB).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// How a message was (or should be) encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    Line,
    Framed,
}

/// One decoded message body and the encoding it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub body: Vec<u8>,
    pub mode: FrameMode,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: u64, limit: usize },

    #[error("connection closed mid-frame")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the connection can no longer be read after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Truncated | Self::Io(_))
    }
}
