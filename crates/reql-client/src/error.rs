//! Client error types.

use std::sync::Arc;

use reql_codec::CodecError;
use reql_protocol::{ErrorType, Query, Response, ResponseType};
use serde_json::Value;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during client operations.
///
/// Errors are `Clone` so that a cursor's terminal error can be reported to
/// every subsequent fetch; transport errors are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Driver-level failure: connecting, handshaking or a protocol violation.
    #[error("{0}")]
    Driver(String),

    /// The connection was closed while the operation was outstanding.
    #[error("{0}")]
    ConnectionClosed(String),

    /// Connecting did not finish before the deadline.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// A query or cursor fetch did not finish before the deadline.
    #[error("operation timed out")]
    QueryTimeout,

    /// The server reported a query error.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] reql_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(Arc<CodecError>),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] reql_types::TypeError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Self::Codec(Arc::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl Error {
    /// Check if this error was reported by the server for a query.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server(_))
    }

    /// Check if this error means the connection is unusable.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Driver(_)
                | Self::ConnectionClosed(_)
                | Self::ConnectionTimeout
                | Self::Codec(_)
                | Self::Io(_)
        )
    }

    /// Check if this error is a deadline expiry.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout | Self::QueryTimeout)
    }

    /// Get the server error details, if this is a server error.
    #[must_use]
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// Category of a server-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// The server could not interpret what the client sent.
    Client,
    /// The query failed to compile.
    Compile,
    /// The query failed while running. The classification is absent on
    /// servers that predate error types and for codes this client does not
    /// know.
    Runtime(Option<ErrorType>),
}

impl std::fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => f.write_str("client error"),
            Self::Compile => f.write_str("compile error"),
            Self::Runtime(None) => f.write_str("runtime error"),
            Self::Runtime(Some(kind)) => write!(f, "runtime error ({kind:?})"),
        }
    }
}

/// A query error reported by the server.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ServerError {
    /// Error category.
    pub kind: ServerErrorKind,
    /// Server message.
    pub message: String,
    /// Path into the term tree where the error occurred.
    pub backtrace: Option<Value>,
    /// Term of the query that failed.
    pub term: Option<Value>,
}

impl ServerError {
    /// Build the error for an error response to `query`.
    ///
    /// Returns `None` if the response is not an error response.
    #[must_use]
    pub fn from_response(response: &Response, query: &Query) -> Option<Self> {
        let kind = match response.response_type {
            ResponseType::ClientError => ServerErrorKind::Client,
            ResponseType::CompileError => ServerErrorKind::Compile,
            ResponseType::RuntimeError => ServerErrorKind::Runtime(response.error_type),
            _ => return None,
        };

        let message = match response.data.first() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        };

        Some(Self {
            kind,
            message,
            backtrace: response.backtrace.clone(),
            term: query.term.clone(),
        })
    }

    /// Runtime error classification, if any.
    #[must_use]
    pub fn error_type(&self) -> Option<ErrorType> {
        match self.kind {
            ServerErrorKind::Runtime(t) => t,
            _ => None,
        }
    }
}

/// Render an error response into a client error.
pub(crate) fn make_error(response: &Response, query: &Query) -> Error {
    match ServerError::from_response(response, query) {
        Some(e) => Error::Server(e),
        None => Error::Driver(format!(
            "Unexpected response type {:?} for query.",
            response.response_type
        )),
    }
}
