//! Mock ReQL server for unit testing.
//!
//! This module provides a scripted RethinkDB stand-in that speaks the V0_4
//! handshake and the framed JSON protocol, so client behaviour can be tested
//! without a real database.
//!
//! ## Features
//!
//! - Configurable handshake reply and auth key check
//! - Scripted responses keyed by the query's term
//! - Multi-batch cursors served on `CONTINUE`, ended by `STOP`
//! - Delayed, silent and misrouted responses, and dropped connections
//! - A log of every query received, for assertions
//!
//! ## Example
//!
//! ```rust,ignore
//! use reql_testing::mock_server::{MockReqlServer, MockResponse};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockReqlServer::builder()
//!         .with_response(json!([15, ["posts"]]), MockResponse::batches(vec![
//!             vec![json!(1), json!(2)],
//!             vec![json!(3)],
//!         ]))
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     // Connect your client to server.addr()...
//! }
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use reql_codec::{CodecError, Connection, Frame, FrameSender};
use reql_protocol::{
    ErrorType, HANDSHAKE_SUCCESS, PROTOCOL_JSON, Query, QueryType, ResponseType, VERSION_V0_4,
};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Scripted reply to a `START` query.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// `SUCCESS_ATOM` carrying one value.
    Atom(Value),
    /// A cursor: every batch but the last is sent as `SUCCESS_PARTIAL`, the
    /// last as `SUCCESS_SEQUENCE`. Batches after the first are sent one per
    /// `CONTINUE`.
    Batches(Vec<Vec<Value>>),
    /// An error response.
    Error {
        /// `CLIENT_ERROR`, `COMPILE_ERROR` or `RUNTIME_ERROR`.
        response_type: ResponseType,
        /// Error message.
        message: String,
        /// Runtime error classification.
        error_type: Option<ErrorType>,
    },
    /// Reply after a delay.
    Delayed(Duration, Box<MockResponse>),
    /// Reply under a token the client never used.
    WrongToken(Box<MockResponse>),
    /// Send these bytes as the payload, verbatim.
    Raw(Bytes),
    /// Never reply.
    Silent,
    /// Drop the connection instead of replying.
    Disconnect,
}

impl MockResponse {
    /// An atom response.
    pub fn atom(value: Value) -> Self {
        Self::Atom(value)
    }

    /// A complete sequence delivered in one batch.
    pub fn sequence(rows: Vec<Value>) -> Self {
        Self::Batches(vec![rows])
    }

    /// A cursor delivered in several batches.
    pub fn batches(batches: Vec<Vec<Value>>) -> Self {
        Self::Batches(batches)
    }

    /// A runtime error of the given kind.
    pub fn runtime_error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self::Error {
            response_type: ResponseType::RuntimeError,
            message: message.into(),
            error_type: Some(error_type),
        }
    }

    /// A compile error.
    pub fn compile_error(message: impl Into<String>) -> Self {
        Self::Error {
            response_type: ResponseType::CompileError,
            message: message.into(),
            error_type: None,
        }
    }

    /// Delay this response.
    #[must_use]
    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// Configuration for the mock ReQL server.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Responses keyed by the serialized term.
    responses: HashMap<String, MockResponse>,
    /// Response for unmatched terms.
    default_response: MockResponse,
    /// Handshake reply override (sent without the NUL).
    handshake_reply: Option<String>,
    /// Expected auth key; any key is accepted when unset.
    auth_key: Option<String>,
    /// Delay before answering a `CONTINUE`.
    continue_delay: Option<Duration>,
    /// Reported by `SERVER_INFO`.
    server_name: String,
}

/// Builder for [`MockReqlServer`].
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: MockServerConfig {
                responses: HashMap::new(),
                default_response: MockResponse::Atom(Value::Null),
                handshake_reply: None,
                auth_key: None,
                continue_delay: None,
                server_name: "mock".to_string(),
            },
        }
    }

    /// Add a response for queries whose term equals `term`.
    pub fn with_response(mut self, term: Value, response: MockResponse) -> Self {
        self.config.responses.insert(term.to_string(), response);
        self
    }

    /// Set the response for unmatched queries.
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.config.default_response = response;
        self
    }

    /// Reply to the handshake with `reply` instead of `SUCCESS`.
    pub fn with_handshake_reply(mut self, reply: impl Into<String>) -> Self {
        self.config.handshake_reply = Some(reply.into());
        self
    }

    /// Reject clients that do not present this auth key.
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.config.auth_key = Some(key.into());
        self
    }

    /// Delay every continuation batch.
    pub fn with_continue_delay(mut self, delay: Duration) -> Self {
        self.config.continue_delay = Some(delay);
        self
    }

    /// Set the server name reported by `SERVER_INFO`.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockReqlServer> {
        MockReqlServer::start(self.config).await
    }
}

impl Default for MockServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mock ReQL server for testing.
pub struct MockReqlServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    connection_count: Arc<Mutex<usize>>,
    received: Arc<Mutex<Vec<Query>>>,
}

impl MockReqlServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));
        let received = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
            received: received.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = config.clone();
                                let count = connection_count.clone();
                                let received = received.clone();
                                let shutdown_rx = shutdown_tx.subscribe();
                                tokio::spawn(async move {
                                    *count.lock().await += 1;
                                    if let Err(e) = handle_connection(stream, config, received, shutdown_rx).await {
                                        tracing::debug!("Connection error: {}", e);
                                    }
                                    let mut c = count.lock().await;
                                    *c = c.saturating_sub(1);
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get the number of connections currently being served.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Every query received so far, in arrival order.
    pub async fn received(&self) -> Vec<Query> {
        self.received.lock().await.clone()
    }

    /// Received queries of one type.
    pub async fn received_of(&self, query_type: QueryType) -> Vec<Query> {
        self.received
            .lock()
            .await
            .iter()
            .filter(|q| q.query_type == query_type)
            .cloned()
            .collect()
    }

    /// Stop accepting and drop every open connection.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockReqlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read the client greeting and return its auth key.
async fn read_greeting(stream: &mut TcpStream) -> Result<String> {
    let version = stream.read_u32_le().await?;
    if version != VERSION_V0_4 {
        return Err(MockServerError::Protocol(format!(
            "unsupported protocol version {version:#x}"
        )));
    }

    let key_len = stream.read_u32_le().await? as usize;
    let mut key = vec![0u8; key_len];
    stream.read_exact(&mut key).await?;

    let protocol = stream.read_u32_le().await?;
    if protocol != PROTOCOL_JSON {
        return Err(MockServerError::Protocol(format!(
            "unsupported wire protocol {protocol:#x}"
        )));
    }

    String::from_utf8(key).map_err(|_| MockServerError::Protocol("auth key is not UTF-8".into()))
}

/// Handle a single client connection.
async fn handle_connection(
    mut stream: TcpStream,
    config: Arc<MockServerConfig>,
    received: Arc<Mutex<Vec<Query>>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let key = read_greeting(&mut stream).await?;

    let reply = match (&config.handshake_reply, &config.auth_key) {
        (Some(reply), _) => reply.clone(),
        (None, Some(expected)) if *expected != key => {
            "ERROR: Incorrect authorization key.\n".to_string()
        }
        _ => HANDSHAKE_SUCCESS.to_string(),
    };
    stream.write_all(reply.as_bytes()).await?;
    stream.write_all(&[0]).await?;
    stream.flush().await?;

    if reply != HANDSHAKE_SUCCESS {
        // Wait for the client to hang up.
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await?;
        return Ok(());
    }

    let (mut reader, sender) = Connection::new(stream).into_split();
    let mut cursors: HashMap<i64, VecDeque<Vec<Value>>> = HashMap::new();

    loop {
        let frame = tokio::select! {
            frame = reader.next() => frame,
            _ = shutdown_rx.recv() => break,
        };
        let frame = match frame {
            Some(frame) => frame?,
            None => break,
        };

        let query = Query::decode(frame.token, &frame.payload)
            .map_err(|e| MockServerError::Protocol(e.to_string()))?;
        tracing::debug!(token = query.token, query_type = ?query.query_type, "mock received query");
        received.lock().await.push(query.clone());

        let token = query.token;
        match query.query_type {
            QueryType::Start => {
                let term = query.term.as_ref().map(Value::to_string).unwrap_or_default();
                let response = config
                    .responses
                    .get(&term)
                    .unwrap_or(&config.default_response)
                    .clone();
                let noreply = query.is_noreply();
                match plan(response, &query, &mut cursors) {
                    Plan::Disconnect => break,
                    _ if noreply => {}
                    plan => plan.execute(token, &sender),
                }
            }
            QueryType::Continue => {
                let plan = match cursors.get_mut(&token).and_then(VecDeque::pop_front) {
                    Some(batch) => {
                        let more = cursors.get(&token).is_some_and(|rest| !rest.is_empty());
                        if !more {
                            cursors.remove(&token);
                        }
                        Plan::Send(batch_body(batch, more))
                    }
                    None => Plan::Send(error_body(
                        ResponseType::ClientError,
                        &format!("Token {token} not in stream cache."),
                        None,
                    )),
                };
                match config.continue_delay {
                    Some(delay) => Plan::Delayed(delay, Box::new(plan)).execute(token, &sender),
                    None => plan.execute(token, &sender),
                }
            }
            QueryType::Stop => {
                cursors.remove(&token);
                Plan::Send(batch_body(Vec::new(), false)).execute(token, &sender);
            }
            QueryType::NoreplyWait => {
                Plan::Send(json!({"t": ResponseType::WaitComplete as i64, "r": []}))
                    .execute(token, &sender);
            }
            QueryType::ServerInfo => {
                let info = json!({"id": "00000000-0000-0000-0000-000000000000", "name": config.server_name, "proxy": false});
                Plan::Send(json!({"t": ResponseType::ServerInfo as i64, "r": [info]}))
                    .execute(token, &sender);
            }
        }
    }

    Ok(())
}

/// What to write for one query.
enum Plan {
    Send(Value),
    SendRaw(Bytes),
    Delayed(Duration, Box<Plan>),
    Retoken(Box<Plan>),
    Nothing,
    Disconnect,
}

impl Plan {
    fn execute(self, token: i64, sender: &FrameSender<TcpStream>) {
        match self {
            Self::Delayed(delay, inner) => {
                let sender = sender.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.execute(token, &sender);
                });
            }
            Self::Retoken(inner) => inner.execute(token + 1_000_000, sender),
            Self::Send(body) => send(sender, Frame::new(token, Bytes::from(body.to_string()))),
            Self::SendRaw(payload) => send(sender, Frame::new(token, payload)),
            Self::Nothing | Self::Disconnect => {}
        }
    }
}

fn send(sender: &FrameSender<TcpStream>, frame: Frame) {
    let sender = sender.clone();
    tokio::spawn(async move {
        if let Err(e) = sender.send(frame).await {
            tracing::debug!("mock failed to send response: {}", e);
        }
    });
}

/// Work out the reply to a `START`, registering any cursor it opens.
fn plan(
    response: MockResponse,
    query: &Query,
    cursors: &mut HashMap<i64, VecDeque<Vec<Value>>>,
) -> Plan {
    match response {
        MockResponse::Atom(value) => {
            let mut body = json!({"t": ResponseType::SuccessAtom as i64, "r": [value]});
            if query.wants_profile() {
                body["p"] = json!([{"description": "Evaluating datum.", "duration(ms)": 0.01}]);
            }
            Plan::Send(body)
        }
        MockResponse::Batches(batches) => {
            let mut batches: VecDeque<_> = batches.into();
            let first = batches.pop_front().unwrap_or_default();
            let more = !batches.is_empty();
            if more {
                cursors.insert(query.token, batches);
            }
            Plan::Send(batch_body(first, more))
        }
        MockResponse::Error {
            response_type,
            message,
            error_type,
        } => Plan::Send(error_body(response_type, &message, error_type)),
        MockResponse::Delayed(delay, inner) => {
            Plan::Delayed(delay, Box::new(plan(*inner, query, cursors)))
        }
        MockResponse::WrongToken(inner) => Plan::Retoken(Box::new(plan(*inner, query, cursors))),
        MockResponse::Raw(payload) => Plan::SendRaw(payload),
        MockResponse::Silent => Plan::Nothing,
        MockResponse::Disconnect => Plan::Disconnect,
    }
}

fn batch_body(rows: Vec<Value>, more: bool) -> Value {
    let response_type = if more {
        ResponseType::SuccessPartial
    } else {
        ResponseType::SuccessSequence
    };
    json!({"t": response_type as i64, "r": rows})
}

fn error_body(response_type: ResponseType, message: &str, error_type: Option<ErrorType>) -> Value {
    let mut body = json!({"t": response_type as i64, "r": [message], "b": []});
    if let Some(error_type) = error_type {
        body["e"] = json!(error_type.code());
    }
    body
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_bodies() {
        assert_eq!(batch_body(vec![json!(1)], true), json!({"t": 3, "r": [1]}));
        assert_eq!(batch_body(vec![], false), json!({"t": 2, "r": []}));
    }

    #[test]
    fn test_error_body_carries_code() {
        let body = error_body(
            ResponseType::RuntimeError,
            "Table `x` does not exist.",
            Some(ErrorType::OpFailed),
        );
        assert_eq!(body["t"], 18);
        assert_eq!(body["e"], 4_100_000);
    }

    #[test]
    fn test_multi_batch_plan_registers_cursor() {
        let mut cursors = HashMap::new();
        let query = Query::start(3, json!(1), serde_json::Map::new());
        let response = MockResponse::batches(vec![vec![json!(1)], vec![json!(2)]]);

        let Plan::Send(body) = plan(response, &query, &mut cursors) else {
            unreachable!("batches always send");
        };
        assert_eq!(body["t"], 3);
        assert_eq!(cursors.get(&3).map(VecDeque::len), Some(1));
    }

    #[tokio::test]
    async fn test_server_starts_and_listens() {
        let server = MockReqlServer::builder().build().await.unwrap();
        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert_eq!(server.connection_count().await, 0);
        assert!(server.received().await.is_empty());
    }
}
