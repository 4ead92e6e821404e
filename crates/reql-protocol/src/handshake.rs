//! V0_4 connection handshake.
//!
//! The client opens with a length-prefixed greeting:
//!
//! ```text
//! u32 LE  version magic (V0_4)
//! u32 LE  auth key length
//! [u8]    auth key
//! u32 LE  protocol magic (JSON)
//! ```
//!
//! The server replies with text terminated by a single NUL byte. The first
//! line of that text is `SUCCESS` when the connection is accepted; anything
//! else is an error message.

use bytes::{BufMut, Bytes, BytesMut};

/// Magic number selecting protocol version V0_4.
pub const VERSION_V0_4: u32 = 0x400c_2d20;

/// Magic number selecting the JSON payload protocol.
pub const PROTOCOL_JSON: u32 = 0x7e69_70c7;

/// Literal first line of an accepting handshake reply.
pub const HANDSHAKE_SUCCESS: &str = "SUCCESS";

/// Client greeting sent right after the TCP connection is established.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Handshake {
    auth_key: String,
}

impl Handshake {
    /// Create a handshake carrying the given auth key (may be empty).
    #[must_use]
    pub fn new(auth_key: impl Into<String>) -> Self {
        Self {
            auth_key: auth_key.into(),
        }
    }

    /// Encode the greeting bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let key = self.auth_key.as_bytes();
        let mut buf = BytesMut::with_capacity(12 + key.len());
        buf.put_u32_le(VERSION_V0_4);
        buf.put_u32_le(key.len() as u32);
        buf.put_slice(key);
        buf.put_u32_le(PROTOCOL_JSON);
        buf.freeze()
    }
}

/// The server's handshake reply, with the NUL terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReply {
    message: String,
}

impl HandshakeReply {
    /// Interpret raw reply bytes (terminator excluded).
    ///
    /// Invalid UTF-8 is replaced rather than rejected so that the server's
    /// message can still be reported.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let first_line = text.split('\n').next().unwrap_or_default();
        Self {
            message: first_line.to_string(),
        }
    }

    /// First line of the reply.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check whether the server accepted the connection.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.message == HANDSHAKE_SUCCESS
    }
}
