//! Codec error types.

use reql_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while framing or handshaking.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Wire-level protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Frame payload exceeds the configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced payload size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Peer closed the connection in the middle of a frame or reply.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Check if the error came from the transport rather than the peer's data.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}
