//! Query payloads.
//!
//! A query travels as a JSON array: `[type, term?, options?]`. Only `START`
//! carries a term and global options; the control queries (`CONTINUE`,
//! `STOP`, `NOREPLY_WAIT`, `SERVER_INFO`) are just `[type]` on the token they
//! refer to.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::types::QueryType;

/// A query ready to be framed and written to the server.
///
/// The term is opaque to the transport: it is whatever JSON term tree the
/// query builder produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Query type.
    pub query_type: QueryType,
    /// Token correlating this query with its responses.
    pub token: i64,
    /// Serialized ReQL term (only for `START`).
    pub term: Option<Value>,
    /// Global optional arguments (only for `START`).
    pub options: Map<String, Value>,
}

impl Query {
    /// Create a `START` query.
    #[must_use]
    pub fn start(token: i64, term: Value, options: Map<String, Value>) -> Self {
        Self {
            query_type: QueryType::Start,
            token,
            term: Some(term),
            options,
        }
    }

    /// Create a `CONTINUE` query for an open cursor.
    #[must_use]
    pub fn continuation(token: i64) -> Self {
        Self::control(QueryType::Continue, token)
    }

    /// Create a `STOP` query for an open cursor.
    #[must_use]
    pub fn stop(token: i64) -> Self {
        Self::control(QueryType::Stop, token)
    }

    /// Create a `NOREPLY_WAIT` query.
    #[must_use]
    pub fn noreply_wait(token: i64) -> Self {
        Self::control(QueryType::NoreplyWait, token)
    }

    /// Create a `SERVER_INFO` query.
    #[must_use]
    pub fn server_info(token: i64) -> Self {
        Self::control(QueryType::ServerInfo, token)
    }

    fn control(query_type: QueryType, token: i64) -> Self {
        Self {
            query_type,
            token,
            term: None,
            options: Map::new(),
        }
    }

    /// Look up a global option by name.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    /// Check whether the query was started with `noreply: true`.
    #[must_use]
    pub fn is_noreply(&self) -> bool {
        self.flag("noreply")
    }

    /// Check whether the query was started with `profile: true`.
    #[must_use]
    pub fn wants_profile(&self) -> bool {
        self.flag("profile")
    }

    fn flag(&self, name: &str) -> bool {
        self.option(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Serialize the query payload (the bytes following the frame header).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut message = vec![Value::from(self.query_type.as_u8())];
        if let Some(term) = &self.term {
            message.push(term.clone());
        }
        if !self.options.is_empty() {
            message.push(Value::Object(self.options.clone()));
        }
        Bytes::from(Value::Array(message).to_string())
    }

    /// Parse a query payload, as a server would.
    pub fn decode(token: i64, payload: &[u8]) -> Result<Self, ProtocolError> {
        let malformed = |reason: &str| ProtocolError::MalformedPayload(reason.to_string());

        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))?;
        let Value::Array(mut parts) = value else {
            return Err(malformed("query is not an array"));
        };
        if parts.is_empty() || parts.len() > 3 {
            return Err(malformed("query must have 1 to 3 elements"));
        }

        let options = match parts.len() {
            3 => match parts.pop() {
                Some(Value::Object(options)) => options,
                _ => return Err(malformed("query options must be an object")),
            },
            _ => Map::new(),
        };
        let term = if parts.len() == 2 { parts.pop() } else { None };
        let query_type = parts[0]
            .as_i64()
            .ok_or_else(|| malformed("query type must be an integer"))
            .and_then(QueryType::from_i64)?;

        if term.is_some() != (query_type == QueryType::Start) {
            return Err(malformed("only START queries carry a term"));
        }

        Ok(Self {
            query_type,
            token,
            term,
            options,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_start_with_options() {
        let mut options = Map::new();
        options.insert("db".into(), json!([14, ["blog"]]));
        let query = Query::start(3, json!([39, [[15, ["posts"]]]]), options);

        let payload = query.encode();
        let decoded: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, json!([1, [39, [[15, ["posts"]]]], {"db": [14, ["blog"]]}]));
    }

    #[test]
    fn test_encode_start_without_options() {
        let query = Query::start(1, json!(1), Map::new());
        assert_eq!(&query.encode()[..], b"[1,1]");
    }

    #[test]
    fn test_encode_control_queries() {
        assert_eq!(&Query::continuation(9).encode()[..], b"[2]");
        assert_eq!(&Query::stop(9).encode()[..], b"[3]");
        assert_eq!(&Query::noreply_wait(9).encode()[..], b"[4]");
        assert_eq!(&Query::server_info(9).encode()[..], b"[5]");
    }

    #[test]
    fn test_decode_matches_encode() {
        let mut options = Map::new();
        options.insert("profile".into(), json!(true));
        let query = Query::start(5, json!([15, ["posts"]]), options);
        assert_eq!(Query::decode(5, &query.encode()).unwrap(), query);
        assert_eq!(
            Query::decode(6, b"[3]").unwrap(),
            Query::stop(6)
        );
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        assert!(Query::decode(1, b"{}").is_err());
        assert!(Query::decode(1, b"[]").is_err());
        assert!(Query::decode(1, b"[2, 1]").is_err());
        assert!(Query::decode(1, b"[1, 1, 2]").is_err());
        assert_eq!(
            Query::decode(1, b"[9]"),
            Err(ProtocolError::UnknownQueryType(9))
        );
    }

    #[test]
    fn test_option_flags() {
        let mut options = Map::new();
        options.insert("noreply".into(), json!(true));
        options.insert("profile".into(), json!("yes"));
        let query = Query::start(1, json!(null), options);

        assert!(query.is_noreply());
        assert!(!query.wants_profile(), "non-boolean flag is not set");
        assert!(!Query::continuation(1).is_noreply());
    }
}
