//! Trait for converting ReQL values to Rust types.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};

use crate::datum::Datum;
use crate::error::TypeError;

/// Trait for types that can be extracted from a [`Datum`].
pub trait FromDatum: Sized {
    /// Convert from a datum to this type.
    fn from_datum(value: &Datum) -> Result<Self, TypeError>;

    /// Convert from a possibly-null datum.
    ///
    /// Returns `None` if the value is null.
    fn from_datum_nullable(value: &Datum) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_datum(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &Datum) -> TypeError {
    match value {
        Datum::Null => TypeError::UnexpectedNull,
        _ => TypeError::TypeMismatch {
            expected,
            actual: value.type_name(),
        },
    }
}

impl FromDatum for Datum {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl FromDatum for bool {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromDatum for f64 {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromDatum for i64 {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        let v = value.as_f64().ok_or_else(|| mismatch("i64", value))?;
        // i64::MAX as f64 rounds up to 2^63, which is out of range.
        let limit = -(i64::MIN as f64);
        if v.fract() != 0.0 || v < -limit || v >= limit {
            return Err(TypeError::OutOfRange { target_type: "i64" });
        }
        Ok(v as i64)
    }
}

impl FromDatum for i32 {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        i64::from_datum(value).and_then(|v| {
            i32::try_from(v).map_err(|_| TypeError::OutOfRange { target_type: "i32" })
        })
    }
}

impl FromDatum for u64 {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        i64::from_datum(value).and_then(|v| {
            u64::try_from(v).map_err(|_| TypeError::OutOfRange { target_type: "u64" })
        })
    }
}

impl FromDatum for String {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromDatum for Bytes {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        match value {
            Datum::Binary(v) => Ok(v.clone()),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromDatum for DateTime<FixedOffset> {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        match value {
            Datum::Time(v) => Ok(*v),
            _ => Err(mismatch("DateTime<FixedOffset>", value)),
        }
    }
}

impl<T: FromDatum> FromDatum for Vec<T> {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        value
            .as_array()
            .ok_or_else(|| mismatch("Vec", value))?
            .iter()
            .map(T::from_datum)
            .collect()
    }
}

impl<T: FromDatum> FromDatum for BTreeMap<String, T> {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        value
            .as_object()
            .ok_or_else(|| mismatch("BTreeMap", value))?
            .iter()
            .map(|(k, v)| T::from_datum(v).map(|v| (k.clone(), v)))
            .collect()
    }
}

impl<T: FromDatum> FromDatum for Option<T> {
    fn from_datum(value: &Datum) -> Result<Self, TypeError> {
        T::from_datum_nullable(value)
    }
}
