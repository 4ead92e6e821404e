//! Frame envelope definitions.
//!
//! Every message after the handshake, in both directions, is prefixed by a
//! fixed 12-byte header:
//!
//! ```text
//! +----------------+--------------+---------------------+
//! | token (i64 LE) | len (u32 LE) | payload (len bytes) |
//! +----------------+--------------+---------------------+
//! ```

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Frame header size in bytes.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Default upper bound for a single frame payload (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Frame header: the token correlating request and response plus the
/// payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Query token this frame belongs to.
    pub token: i64,
    /// Payload length in bytes (header excluded).
    pub length: u32,
}

impl FrameHeader {
    /// Create a new frame header.
    #[must_use]
    pub const fn new(token: i64, length: u32) -> Self {
        Self { token, length }
    }

    /// Parse a frame header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::IncompleteHeader {
                expected: FRAME_HEADER_SIZE,
                actual: src.remaining(),
            });
        }

        let token = src.get_i64_le();
        let length = src.get_u32_le();

        Ok(Self { token, length })
    }

    /// Encode the frame header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i64_le(self.token);
        dst.put_u32_le(self.length);
    }

    /// Payload length as `usize`.
    #[must_use]
    pub fn payload_length(&self) -> usize {
        self.length as usize
    }

    /// Total frame length including header.
    #[must_use]
    pub fn frame_length(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload_length()
    }
}
