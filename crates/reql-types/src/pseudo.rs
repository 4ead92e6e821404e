//! Pseudo-type conversion.
//!
//! Values tagged with `$reql_type$` are converted according to the query's
//! `time_format`, `binary_format` and `group_format` options. `"native"`
//! (the default) converts; `"raw"` leaves the tagged object as-is.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use crate::datum::Datum;
use crate::error::TypeError;

const REQL_TYPE: &str = "$reql_type$";

/// How a family of pseudo-types should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Convert to the native Rust representation.
    #[default]
    Native,
    /// Keep the tagged JSON object.
    Raw,
}

impl Format {
    fn parse(option: &'static str, value: Option<&Value>) -> Result<Self, TypeError> {
        match value {
            None => Ok(Self::Native),
            Some(Value::String(s)) if s == "native" => Ok(Self::Native),
            Some(Value::String(s)) if s == "raw" => Ok(Self::Raw),
            Some(other) => Err(TypeError::UnknownFormat {
                option,
                value: other.to_string(),
            }),
        }
    }
}

/// Per-query pseudo-type presentation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatOptions {
    /// `time_format`.
    pub time: Format,
    /// `binary_format`.
    pub binary: Format,
    /// `group_format`.
    pub group: Format,
}

impl FormatOptions {
    /// Read the format options out of a query's global options.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self, TypeError> {
        Ok(Self {
            time: Format::parse("time_format", options.get("time_format"))?,
            binary: Format::parse("binary_format", options.get("binary_format"))?,
            group: Format::parse("group_format", options.get("group_format"))?,
        })
    }
}

/// Convert a wire value into a [`Datum`], resolving pseudo-types recursively.
pub fn convert_pseudo(value: Value, format: &FormatOptions) -> Result<Datum, TypeError> {
    match value {
        Value::Null => Ok(Datum::Null),
        Value::Bool(v) => Ok(Datum::Bool(v)),
        Value::Number(n) => Ok(Datum::Number(n.as_f64().unwrap_or(f64::NAN))),
        Value::String(s) => Ok(Datum::String(s)),
        Value::Array(items) => items
            .into_iter()
            .map(|v| convert_pseudo(v, format))
            .collect::<Result<Vec<_>, _>>()
            .map(Datum::Array),
        Value::Object(obj) => convert_object(obj, format),
    }
}

fn convert_object(obj: Map<String, Value>, format: &FormatOptions) -> Result<Datum, TypeError> {
    let reql_type = match obj.get(REQL_TYPE) {
        Some(Value::String(t)) => Some(t.clone()),
        _ => None,
    };

    match reql_type.as_deref() {
        Some("TIME") if format.time == Format::Native => convert_time(&obj).map(Datum::Time),
        Some("BINARY") if format.binary == Format::Native => {
            convert_binary(&obj).map(Datum::Binary)
        }
        Some("GROUPED_DATA") if format.group == Format::Native => convert_grouped(obj, format),
        Some("TIME" | "BINARY" | "GROUPED_DATA" | "GEOMETRY") | None => plain_object(obj, format),
        Some(other) => Err(TypeError::UnknownPseudoType(other.to_string())),
    }
}

fn plain_object(obj: Map<String, Value>, format: &FormatOptions) -> Result<Datum, TypeError> {
    obj.into_iter()
        .map(|(k, v)| convert_pseudo(v, format).map(|d| (k, d)))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Datum::Object)
}

fn invalid(reql_type: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidPseudoType {
        reql_type: reql_type.to_string(),
        reason: reason.into(),
    }
}

fn convert_time(obj: &Map<String, Value>) -> Result<DateTime<FixedOffset>, TypeError> {
    let epoch = obj
        .get("epoch_time")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("TIME", "missing field `epoch_time`"))?;
    let timezone = obj
        .get("timezone")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("TIME", "missing field `timezone`"))?;

    let offset = parse_timezone(timezone)
        .ok_or_else(|| invalid("TIME", format!("bad timezone `{timezone}`")))?;

    let secs = epoch.floor();
    let nanos = (((epoch - secs) * 1e9).round() as u32).min(999_999_999);
    let utc = DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| invalid("TIME", format!("epoch_time {epoch} out of range")))?;

    Ok(utc.with_timezone(&offset))
}

/// Parse `+HH:MM`, `-HH:MM` or `Z`.
fn parse_timezone(tz: &str) -> Option<FixedOffset> {
    if tz == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn convert_binary(obj: &Map<String, Value>) -> Result<Bytes, TypeError> {
    let data = obj
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("BINARY", "missing field `data`"))?;
    STANDARD
        .decode(data)
        .map(Bytes::from)
        .map_err(|e| invalid("BINARY", e.to_string()))
}

fn convert_grouped(mut obj: Map<String, Value>, format: &FormatOptions) -> Result<Datum, TypeError> {
    let Some(Value::Array(groups)) = obj.remove("data") else {
        return Err(invalid("GROUPED_DATA", "missing field `data`"));
    };

    groups
        .into_iter()
        .map(|pair| match pair {
            Value::Array(mut kv) if kv.len() == 2 => {
                let reduction = convert_pseudo(kv.pop().unwrap_or(Value::Null), format)?;
                let group = convert_pseudo(kv.pop().unwrap_or(Value::Null), format)?;
                let mut fields = BTreeMap::new();
                fields.insert("group".to_string(), group);
                fields.insert("reduction".to_string(), reduction);
                Ok(Datum::Object(fields))
            }
            _ => Err(invalid("GROUPED_DATA", "group is not a [key, value] pair")),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Datum::Array)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn native(value: Value) -> Result<Datum, TypeError> {
        convert_pseudo(value, &FormatOptions::default())
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(native(json!(null)).unwrap(), Datum::Null);
        assert_eq!(native(json!(1.5)).unwrap(), Datum::Number(1.5));
        assert_eq!(
            native(json!(["a", true])).unwrap(),
            Datum::Array(vec![Datum::from("a"), Datum::Bool(true)])
        );
    }

    #[test]
    fn test_time_native() {
        let value = json!({"$reql_type$": "TIME", "epoch_time": 1_500_000_000.25, "timezone": "-07:00"});
        let Datum::Time(t) = native(value).unwrap() else {
            panic!("expected time");
        };
        assert_eq!(t.timestamp(), 1_500_000_000);
        assert_eq!(t.timestamp_subsec_millis(), 250);
        assert_eq!(t.offset().local_minus_utc(), -7 * 3600);
    }

    #[test]
    fn test_time_raw_is_left_alone() {
        let value = json!({"$reql_type$": "TIME", "epoch_time": 0, "timezone": "+00:00"});
        let format = FormatOptions {
            time: Format::Raw,
            ..Default::default()
        };
        let datum = convert_pseudo(value, &format).unwrap();
        assert_eq!(datum.get("$reql_type$").and_then(Datum::as_str), Some("TIME"));
    }

    #[test]
    fn test_time_invalid() {
        let missing = json!({"$reql_type$": "TIME", "timezone": "+00:00"});
        assert!(matches!(
            native(missing),
            Err(TypeError::InvalidPseudoType { .. })
        ));
        let bad_tz = json!({"$reql_type$": "TIME", "epoch_time": 0, "timezone": "UTC"});
        assert!(native(bad_tz).is_err());
    }

    #[test]
    fn test_binary_native_nested() {
        let value = json!({"file": {"$reql_type$": "BINARY", "data": "aGVsbG8="}});
        let datum = native(value).unwrap();
        assert_eq!(
            datum.get("file"),
            Some(&Datum::Binary(Bytes::from_static(b"hello")))
        );
    }

    #[test]
    fn test_grouped_data() {
        let value = json!({"$reql_type$": "GROUPED_DATA", "data": [["a", 1], ["b", 2]]});
        let datum = native(value).unwrap();
        let groups = datum.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].get("group"), Some(&Datum::from("b")));
        assert_eq!(groups[1].get("reduction"), Some(&Datum::Number(2.0)));
    }

    #[test]
    fn test_geometry_passes_through() {
        let value = json!({"$reql_type$": "GEOMETRY", "type": "Point", "coordinates": [0, 0]});
        assert!(native(value).unwrap().get("coordinates").is_some());
    }

    #[test]
    fn test_unknown_pseudo_type() {
        let value = json!({"$reql_type$": "WIDGET"});
        assert_eq!(
            native(value),
            Err(TypeError::UnknownPseudoType("WIDGET".into()))
        );
    }

    #[test]
    fn test_format_options_from_query_options() {
        let mut options = Map::new();
        options.insert("binary_format".into(), json!("raw"));
        let format = FormatOptions::from_options(&options).unwrap();
        assert_eq!(format.binary, Format::Raw);
        assert_eq!(format.time, Format::Native);

        options.insert("time_format".into(), json!("iso"));
        assert!(FormatOptions::from_options(&options).is_err());
    }
}
