//! ReQL frame codec implementation.

use bytes::{BufMut, Bytes, BytesMut};
use reql_protocol::frame::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, FrameHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A token-tagged frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Query token this frame belongs to.
    pub token: i64,
    /// JSON payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    #[must_use]
    pub fn new(token: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            token,
            payload: payload.into(),
        }
    }

    /// Get the total frame size including header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }
}

/// ReQL frame codec for tokio-util framing.
///
/// Frames are a 12-byte little-endian header (token, payload length)
/// followed by the payload.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximum payload size to accept or send.
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a new codec with the default maximum frame size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set a custom maximum payload size.
    #[must_use]
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Maximum payload size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the length without consuming the header
        let length = u32::from_le_bytes([src[8], src[9], src[10], src[11]]) as usize;

        if length > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        let total = FRAME_HEADER_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame_bytes = src.split_to(total);
        let header = FrameHeader::decode(&mut frame_bytes)?;
        let payload = frame_bytes.freeze();

        tracing::trace!(token = header.token, length = length, "decoded frame");

        Ok(Some(Frame {
            token: header.token,
            payload,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let length = item.payload.len();

        if length > self.max_frame_size || length > u32::MAX as usize {
            return Err(CodecError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + length);
        FrameHeader::new(item.token, length as u32).encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(token = item.token, length = length, "encoded frame");

        Ok(())
    }
}
