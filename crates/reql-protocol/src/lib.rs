//! # reql-protocol
//!
//! Pure implementation of the ReQL wire protocol spoken by RethinkDB servers.
//!
//! This crate models everything that travels over the socket: the V0_4
//! handshake, the 12-byte frame envelope that prefixes every message, and the
//! JSON payloads of queries and responses.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. `reql-codec` builds the framed
//! transport on top of it and `reql-client` owns the connection.
//!
//! ## Example
//!
//! ```rust
//! use bytes::BytesMut;
//! use reql_protocol::{FrameHeader, Query, FRAME_HEADER_SIZE};
//!
//! let query = Query::noreply_wait(7);
//! let payload = query.encode();
//!
//! let mut buf = BytesMut::new();
//! FrameHeader::new(query.token, payload.len() as u32).encode(&mut buf);
//! assert_eq!(buf.len(), FRAME_HEADER_SIZE);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod frame;
pub mod handshake;
pub mod query;
pub mod response;
pub mod types;

pub use error::ProtocolError;
pub use frame::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, FrameHeader};
pub use handshake::{HANDSHAKE_SUCCESS, Handshake, HandshakeReply, PROTOCOL_JSON, VERSION_V0_4};
pub use query::Query;
pub use response::Response;
pub use types::{ErrorType, QueryType, ResponseNote, ResponseType};
