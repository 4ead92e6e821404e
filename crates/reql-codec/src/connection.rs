//! Split I/O connection.
//!
//! The transport is split into read and write halves so that queries can be
//! written while a single reader task is blocked waiting for responses.

use std::sync::Arc;

use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::error::CodecError;
use crate::frame_codec::{Frame, FrameCodec};
use crate::framed::{FrameReader, FrameWriter};

/// A framed ReQL connection over a handshaken transport.
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: FrameReader<ReadHalf<T>>,
    writer: FrameWriter<WriteHalf<T>>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new connection from a transport.
    ///
    /// The transport is immediately split into read and write halves.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, FrameCodec::new())
    }

    /// Create a new connection with a custom codec for both halves.
    pub fn with_codec(transport: T, codec: FrameCodec) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: FrameReader::with_codec(read_half, codec.clone()),
            writer: FrameWriter::with_codec(write_half, codec),
        }
    }

    /// Separate the read half from a shareable write handle.
    pub fn into_split(self) -> (FrameReader<ReadHalf<T>>, FrameSender<T>) {
        let sender = FrameSender {
            writer: Arc::new(Mutex::new(self.writer)),
        };
        (self.reader, sender)
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Cloneable handle for writing frames.
///
/// Each frame is written and flushed under the lock, so frames from
/// concurrent callers never interleave on the wire.
pub struct FrameSender<T>
where
    T: AsyncRead + AsyncWrite,
{
    writer: Arc<Mutex<FrameWriter<WriteHalf<T>>>>,
}

impl<T> FrameSender<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Write a frame and flush it.
    pub async fn send(&self, frame: Frame) -> Result<(), CodecError> {
        let token = frame.token;
        let mut writer = self.writer.lock().await;
        writer.send(frame).await?;
        tracing::trace!(token = token, "frame sent");
        Ok(())
    }

    /// Flush and shut down the write half.
    pub async fn close(&self) -> Result<(), CodecError> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}

impl<T> Clone for FrameSender<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<T> std::fmt::Debug for FrameSender<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSender").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_concurrent_senders_do_not_interleave() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (_reader, sender) = Connection::new(client).into_split();
        let mut peer = FrameReader::new(server);

        let mut tasks = Vec::new();
        for token in 1..=16i64 {
            let sender = sender.clone();
            tasks.push(tokio::spawn(async move {
                let payload = Bytes::from(vec![b'x'; 512 + token as usize]);
                sender.send(Frame::new(token, payload)).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..16 {
            let frame = peer.next().await.unwrap().unwrap();
            assert_eq!(frame.payload.len(), 512 + frame.token as usize);
            seen.push(frame.token);
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reader_half_receives_frames() {
        let (client, server) = tokio::io::duplex(1024);
        let (mut reader, _sender) = Connection::new(client).into_split();
        let (_peer_reader, peer_sender) = Connection::new(server).into_split();

        peer_sender
            .send(Frame::new(9, Bytes::from_static(b"{\"t\":1}")))
            .await
            .unwrap();

        let frame = reader.next().await.unwrap().unwrap();
        assert_eq!(frame.token, 9);
    }

    #[tokio::test]
    async fn test_close_shuts_down_write_half() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (_reader, sender) = Connection::new(client).into_split();

        sender.close().await.unwrap();

        let mut buf = Vec::new();
        let n = server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
