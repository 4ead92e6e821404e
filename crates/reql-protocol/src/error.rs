//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding ReQL wire structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Not enough bytes to decode a frame header.
    #[error("incomplete frame header: expected {expected} bytes, got {actual}")]
    IncompleteHeader {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// Payload was not valid JSON or had the wrong shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Response carried a type discriminant this driver does not know.
    #[error("unknown response type: {0}")]
    UnknownResponseType(i64),

    /// Query carried a type discriminant this driver does not know.
    #[error("unknown query type: {0}")]
    UnknownQueryType(i64),

    /// Error response carried an unknown error code.
    #[error("unknown error type: {0}")]
    UnknownErrorType(i64),

    /// Handshake reply exceeded the allowed size before its terminator.
    #[error("handshake reply exceeds {max} bytes without a NUL terminator")]
    HandshakeTooLong {
        /// Maximum accepted reply length.
        max: usize,
    },
}
