//! # reql-types
//!
//! ReQL value model and the conversions applied to values coming off the
//! wire.
//!
//! The server encodes values it cannot express in plain JSON as
//! *pseudo-types*: objects tagged with a `$reql_type$` field. This crate turns
//! those into native Rust values according to the query's format options.
//!
//! ## Type Mappings
//!
//! | ReQL type | Rust type |
//! |-----------|-----------|
//! | `NULL` | `Datum::Null` |
//! | `BOOL` | `bool` |
//! | `NUMBER` | `f64` (`i64` via [`FromDatum`]) |
//! | `STRING` | `String` |
//! | `ARRAY` | `Vec<Datum>` |
//! | `OBJECT` | `BTreeMap<String, Datum>` |
//! | `TIME` | `chrono::DateTime<FixedOffset>` |
//! | `BINARY` | `bytes::Bytes` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod datum;
pub mod error;
pub mod from_datum;
pub mod pseudo;

pub use datum::Datum;
pub use error::TypeError;
pub use from_datum::FromDatum;
pub use pseudo::{Format, FormatOptions, convert_pseudo};
