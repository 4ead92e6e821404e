//! ReQL value representation.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

/// A ReQL value after pseudo-type conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// `null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (ReQL numbers are doubles).
    Number(f64),
    /// String.
    String(String),
    /// Array.
    Array(Vec<Datum>),
    /// Object.
    Object(BTreeMap<String, Datum>),
    /// `TIME` pseudo-type.
    Time(DateTime<FixedOffset>),
    /// `BINARY` pseudo-type.
    Binary(Bytes),
}

impl Datum {
    /// Check if the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as an array slice, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Datum]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as an object, if it is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Datum>> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Look up a field of an object.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Datum> {
        self.as_object().and_then(|o| o.get(field))
    }

    /// Name of the ReQL type of this value.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Number(_) => "NUMBER",
            Self::String(_) => "STRING",
            Self::Array(_) => "ARRAY",
            Self::Object(_) => "OBJECT",
            Self::Time(_) => "PTYPE<TIME>",
            Self::Binary(_) => "PTYPE<BINARY>",
        }
    }

    /// Convert back into wire JSON, re-encoding pseudo-types.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(v),
            Self::Number(v) => serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number),
            Self::String(v) => Value::String(v),
            Self::Array(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Time(t) => {
                let epoch = t.timestamp() as f64 + f64::from(t.timestamp_subsec_micros()) / 1e6;
                let mut obj = Map::new();
                obj.insert("$reql_type$".into(), Value::from("TIME"));
                obj.insert("epoch_time".into(), Value::from(epoch));
                obj.insert("timezone".into(), Value::from(t.offset().to_string()));
                Value::Object(obj)
            }
            Self::Binary(data) => {
                let mut obj = Map::new();
                obj.insert("$reql_type$".into(), Value::from("BINARY"));
                obj.insert("data".into(), Value::from(STANDARD.encode(&data)));
                Value::Object(obj)
            }
        }
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Datum {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Datum>> for Datum {
    fn from(v: Vec<Datum>) -> Self {
        Self::Array(v)
    }
}

impl std::fmt::Display for Datum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Time(t) => write!(f, "{}", t.to_rfc3339()),
            other => write!(f, "{}", other.clone().into_json()),
        }
    }
}
