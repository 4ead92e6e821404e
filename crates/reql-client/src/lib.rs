//! # reql-client
//!
//! Async, multiplexed client connection for RethinkDB.
//!
//! Many queries can be in flight on one socket at the same time. Each query
//! carries a token, and a single reader task routes every response back to
//! the caller (or the cursor) waiting on that token.
//!
//! ## Architecture
//!
//! ```text
//!   callers ──run()──► FrameSender (shared write half) ──► socket
//!      ▲                                                     │
//!      │ oneshot / Notify                                    ▼
//!   PendingTable, cursor table ◄──dispatch()── reader task (read half)
//! ```
//!
//! - A query that returns a single value resolves its pending request.
//! - A query that returns a sequence resolves into a [`Cursor`]; later
//!   batches are pushed into the cursor by the reader task.
//! - Timeouts are absolute deadlines. A timed-out caller stops waiting, but
//!   the server keeps working and late responses are still routed.
//! - When the connection is lost, every outstanding caller and cursor fails
//!   with the same "connection is closed" error exactly once.
//!
//! ## Example
//!
//! ```rust,ignore
//! use reql_client::{Config, Connection};
//! use serde_json::{Map, json};
//!
//! #[tokio::main]
//! async fn main() -> reql_client::Result<()> {
//!     let config = Config::from_connection_string("Host=localhost;Db=blog")?;
//!     let conn = Connection::connect(config).await?;
//!
//!     // r.table("posts")
//!     let mut cursor = conn.start(json!([15, ["posts"]]), Map::new()).await?.into_cursor()?;
//!     while let Some(post) = cursor.next(None).await? {
//!         println!("{post}");
//!     }
//!
//!     conn.close(true).await
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod cursor;
pub mod deadline;
pub mod error;
mod instance;
mod pending;
pub mod result;
pub mod state;

pub use config::{Config, DEFAULT_PORT, TimeoutConfig};
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::{Error, Result, ServerError, ServerErrorKind};
pub use instance::Transport;
pub use reql_types::{Datum, FromDatum};
pub use result::QueryResult;
pub use state::ConnectionState;
