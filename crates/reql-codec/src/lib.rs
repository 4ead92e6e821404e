//! # reql-codec
//!
//! Async framing layer for ReQL connections.
//!
//! This crate turns a raw byte stream into token-tagged frames and runs the
//! V0_4 handshake that precedes them.
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → handshake → FrameCodec (token + length framing) → Client
//! ```
//!
//! After the handshake the transport is split into read and write halves.
//! The read half is owned by a single reader task; the write half sits
//! behind a [`FrameSender`] that any number of tasks can clone and use to
//! issue queries while the reader is blocked.
//!
//! ```rust,ignore
//! use reql_codec::{Connection, buffered, handshake};
//! use reql_protocol::Handshake;
//!
//! let mut stream = buffered(TcpStream::connect("localhost:28015").await?);
//! let reply = handshake(&mut stream, &Handshake::new(""), DEFAULT_MAX_HANDSHAKE_REPLY).await?;
//! let (reader, sender) = Connection::new(stream).into_split();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod frame_codec;
pub mod framed;
pub mod handshake;

pub use connection::{Connection, FrameSender};
pub use error::CodecError;
pub use frame_codec::{Frame, FrameCodec};
pub use framed::{FrameReader, FrameWriter};
pub use handshake::{DEFAULT_MAX_HANDSHAKE_REPLY, HANDSHAKE_BUFFER_SIZE, buffered, handshake};
