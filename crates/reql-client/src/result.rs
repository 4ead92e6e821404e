//! Query results.

use reql_types::Datum;
use serde_json::Value;

use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// The outcome of a successful query.
#[derive(Debug)]
pub enum QueryResult {
    /// A single value (`SUCCESS_ATOM` or `SERVER_INFO`).
    Value(Datum),
    /// A stream of rows (`SUCCESS_SEQUENCE` or `SUCCESS_PARTIAL`).
    Cursor(Cursor),
    /// No value: `WAIT_COMPLETE`, or a query sent with `noreply`.
    Empty,
    /// A result together with the server's profile of the query.
    Profiled {
        /// The result itself.
        value: Box<QueryResult>,
        /// Profile information as sent by the server.
        profile: Value,
    },
}

impl QueryResult {
    /// Attach profile information when the query asked for it and the
    /// server sent some.
    pub(crate) fn maybe_profile(self, profile: Option<Value>, wanted: bool) -> Self {
        match profile {
            Some(profile) if wanted => Self::Profiled {
                value: Box::new(self),
                profile,
            },
            _ => self,
        }
    }

    /// Strip any profile wrapper.
    #[must_use]
    pub fn into_inner(self) -> Self {
        match self {
            Self::Profiled { value, .. } => value.into_inner(),
            other => other,
        }
    }

    /// Profile information, if present.
    #[must_use]
    pub fn profile(&self) -> Option<&Value> {
        match self {
            Self::Profiled { profile, .. } => Some(profile),
            _ => None,
        }
    }

    /// Take the single value, failing if the result is something else.
    pub fn into_value(self) -> Result<Datum> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Empty => Ok(Datum::Null),
            Self::Profiled { value, .. } => value.into_value(),
            Self::Cursor(_) => Err(Error::Driver(
                "Expected a single value but the query returned a cursor.".into(),
            )),
        }
    }

    /// Take the cursor, failing if the result is something else.
    pub fn into_cursor(self) -> Result<Cursor> {
        match self {
            Self::Cursor(c) => Ok(c),
            Self::Profiled { value, .. } => value.into_cursor(),
            _ => Err(Error::Driver(
                "Expected a cursor but the query returned a single value.".into(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_requires_request_and_data() {
        let plain = QueryResult::Value(Datum::Null).maybe_profile(Some(json!([])), false);
        assert!(plain.profile().is_none());

        let missing = QueryResult::Value(Datum::Null).maybe_profile(None, true);
        assert!(missing.profile().is_none());

        let profiled = QueryResult::Value(Datum::from(1i64))
            .maybe_profile(Some(json!([{"description": "Evaluating datum."}])), true);
        assert!(profiled.profile().is_some());
        assert_eq!(profiled.into_value().unwrap(), Datum::Number(1.0));
    }

    #[test]
    fn test_into_value_on_empty_is_null() {
        assert_eq!(QueryResult::Empty.into_value().unwrap(), Datum::Null);
        assert!(QueryResult::Empty.into_cursor().is_err());
    }
}
