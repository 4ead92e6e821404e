//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur during value conversion.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },

    /// Number does not fit the target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// A `$reql_type$` object was missing fields or had invalid ones.
    #[error("invalid {reql_type} pseudo-type: {reason}")]
    InvalidPseudoType {
        /// Pseudo-type name (e.g. `TIME`).
        reql_type: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A pseudo-type this driver does not know how to convert.
    #[error("unknown pseudo-type: {0}")]
    UnknownPseudoType(String),

    /// A format option had an unsupported value.
    #[error("unknown {option} format: {value}")]
    UnknownFormat {
        /// Option name (e.g. `time_format`).
        option: &'static str,
        /// The rejected value.
        value: String,
    },
}
