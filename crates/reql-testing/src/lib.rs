//! # reql-testing
//!
//! Test infrastructure for ReQL driver development.
//!
//! This crate provides a mock RethinkDB server that speaks the real
//! handshake and framing, so the client can be exercised end to end without
//! a database.
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use reql_client::{Config, Connection};
//! use reql_testing::{MockReqlServer, MockResponse};
//! use serde_json::{Map, json};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockReqlServer::builder()
//!         .with_response(json!(1), MockResponse::atom(json!("one")))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let config = Config::new().host(server.host()).port(server.port());
//!     let conn = Connection::connect(config).await.unwrap();
//!     let value = conn.start(json!(1), Map::new()).await.unwrap().into_value().unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_server;

pub use mock_server::{
    MockReqlServer, MockResponse, MockServerBuilder, MockServerConfig, MockServerError,
};
