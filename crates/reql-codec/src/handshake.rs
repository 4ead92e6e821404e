//! Handshake exchange on the raw transport.
//!
//! Runs before the transport is split and framed. The transport is read
//! through a [`BufReader`] that stays in front of it afterwards, so bytes the
//! server sends right after the reply are never lost.

use reql_protocol::{Handshake, HandshakeReply, ProtocolError};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::error::CodecError;

/// Upper bound on the size of the server's handshake reply.
pub const DEFAULT_MAX_HANDSHAKE_REPLY: usize = 64 * 1024;

/// Read buffer placed in front of the transport for the handshake.
pub const HANDSHAKE_BUFFER_SIZE: usize = 512;

/// Wrap a raw transport so it can be passed to [`handshake`].
pub fn buffered<T: AsyncRead>(stream: T) -> BufReader<T> {
    BufReader::with_capacity(HANDSHAKE_BUFFER_SIZE, stream)
}

/// Send the greeting and read the NUL-terminated reply.
///
/// Nothing past the terminator is taken out of `stream`'s buffer. Whether
/// the reply is a success is left to the caller.
pub async fn handshake<T>(
    stream: &mut T,
    greeting: &Handshake,
    max_reply: usize,
) -> Result<HandshakeReply, CodecError>
where
    T: AsyncBufRead + AsyncWrite + Unpin,
{
    stream.write_all(&greeting.encode()).await?;
    stream.flush().await?;

    tracing::trace!("sent handshake greeting");

    // One byte over the limit is enough to tell a long reply from EOF.
    let mut reply = Vec::with_capacity(16);
    let limit = u64::try_from(max_reply).unwrap_or(u64::MAX).saturating_add(1);
    (&mut *stream).take(limit).read_until(0, &mut reply).await?;

    match reply.last() {
        Some(0) => {
            reply.pop();
        }
        _ if reply.len() > max_reply => {
            return Err(ProtocolError::HandshakeTooLong { max: max_reply }.into());
        }
        _ => return Err(CodecError::ConnectionClosed),
    }

    let reply = HandshakeReply::parse(&reply);
    tracing::debug!(reply = reply.message(), "received handshake reply");
    Ok(reply)
}
