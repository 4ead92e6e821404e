//! Response payloads.
//!
//! The server answers with a JSON object:
//!
//! ```text
//! {"t": <response type>, "r": [<data>...], "b": <backtrace>?, "p": <profile>?,
//!  "e": <error type>?, "n": [<notes>...]?}
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::{ErrorType, ResponseNote, ResponseType};

/// A decoded server response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Token of the query this response answers.
    pub token: i64,
    /// Response type.
    pub response_type: ResponseType,
    /// Response data, in server order.
    pub data: Vec<Value>,
    /// Backtrace into the term tree (error responses only).
    pub backtrace: Option<Value>,
    /// Profile information (when the query asked for it).
    pub profile: Option<Value>,
    /// Runtime error classification (`RUNTIME_ERROR` only).
    pub error_type: Option<ErrorType>,
    /// Changefeed notes.
    pub notes: Vec<ResponseNote>,
}

#[derive(Deserialize)]
struct RawResponse {
    t: i64,
    #[serde(default)]
    r: Vec<Value>,
    #[serde(default)]
    b: Option<Value>,
    #[serde(default)]
    p: Option<Value>,
    #[serde(default)]
    e: Option<i64>,
    #[serde(default)]
    n: Vec<i64>,
}

impl Response {
    /// Decode a response payload received under `token`.
    pub fn decode(token: i64, payload: &[u8]) -> Result<Self, ProtocolError> {
        let raw: RawResponse = serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;

        let response_type = ResponseType::from_i64(raw.t)?;
        // Unknown codes still describe a query error, not a broken stream.
        let error_type = raw.e.and_then(|e| ErrorType::from_i64(e).ok());

        Ok(Self {
            token,
            response_type,
            data: raw.r,
            backtrace: raw.b,
            profile: raw.p,
            error_type,
            notes: raw.n.into_iter().filter_map(ResponseNote::from_i64).collect(),
        })
    }

    /// Check whether any note marks this response as part of a changefeed.
    #[must_use]
    pub fn is_feed(&self) -> bool {
        self.notes.iter().any(|n| n.is_feed())
    }

    /// The error message of an error response, if the server sent one.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.data.first().and_then(Value::as_str)
    }
}
