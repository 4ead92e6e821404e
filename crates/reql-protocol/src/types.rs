//! ReQL protocol discriminants.
//!
//! Numeric values match the server's `ql2.proto` definitions.

use crate::error::ProtocolError;

/// Type of a query sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QueryType {
    /// Start a new query.
    Start = 1,
    /// Request the next batch of an open cursor.
    Continue = 2,
    /// Stop an open cursor.
    Stop = 3,
    /// Wait for all outstanding noreply queries to finish.
    NoreplyWait = 4,
    /// Ask the server to describe itself.
    ServerInfo = 5,
}

impl QueryType {
    /// Wire value of this query type.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create a query type from its wire value.
    pub fn from_i64(value: i64) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::Start),
            2 => Ok(Self::Continue),
            3 => Ok(Self::Stop),
            4 => Ok(Self::NoreplyWait),
            5 => Ok(Self::ServerInfo),
            _ => Err(ProtocolError::UnknownQueryType(value)),
        }
    }
}

/// Type of a response received from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseType {
    /// A single value.
    SuccessAtom = 1,
    /// The final batch of a sequence.
    SuccessSequence = 2,
    /// A batch of a sequence with more to come.
    SuccessPartial = 3,
    /// Reply to `NOREPLY_WAIT`.
    WaitComplete = 4,
    /// Reply to `SERVER_INFO`.
    ServerInfo = 5,
    /// The client sent something the server could not interpret.
    ClientError = 16,
    /// The query failed to compile.
    CompileError = 17,
    /// The query failed while running.
    RuntimeError = 18,
}

impl ResponseType {
    /// Create a response type from its wire value.
    pub fn from_i64(value: i64) -> Result<Self, ProtocolError> {
        match value {
            1 => Ok(Self::SuccessAtom),
            2 => Ok(Self::SuccessSequence),
            3 => Ok(Self::SuccessPartial),
            4 => Ok(Self::WaitComplete),
            5 => Ok(Self::ServerInfo),
            16 => Ok(Self::ClientError),
            17 => Ok(Self::CompileError),
            18 => Ok(Self::RuntimeError),
            _ => Err(ProtocolError::UnknownResponseType(value)),
        }
    }

    /// Check whether this response opens or continues a sequence.
    #[must_use]
    pub fn is_sequence(self) -> bool {
        matches!(self, Self::SuccessSequence | Self::SuccessPartial)
    }

    /// Check whether this response reports a failure.
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::ClientError | Self::CompileError | Self::RuntimeError
        )
    }
}

/// Runtime error classification carried in the `e` field of a
/// `RUNTIME_ERROR` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Internal server error.
    Internal,
    /// A resource limit (e.g. array size) was exceeded.
    ResourceLimit,
    /// Logic error in the query.
    QueryLogic,
    /// A referenced entity does not exist.
    NonExistence,
    /// The operation failed; no changes were made.
    OpFailed,
    /// The operation may or may not have taken effect.
    OpIndeterminate,
    /// Error raised by `r.error` in user code.
    User,
    /// The user lacks the required permissions.
    Permission,
}

impl ErrorType {
    /// Create an error type from its wire value.
    pub fn from_i64(value: i64) -> Result<Self, ProtocolError> {
        match value {
            1_000_000 => Ok(Self::Internal),
            2_000_000 => Ok(Self::ResourceLimit),
            3_000_000 => Ok(Self::QueryLogic),
            3_100_000 => Ok(Self::NonExistence),
            4_100_000 => Ok(Self::OpFailed),
            4_200_000 => Ok(Self::OpIndeterminate),
            5_000_000 => Ok(Self::User),
            6_000_000 => Ok(Self::Permission),
            _ => Err(ProtocolError::UnknownErrorType(value)),
        }
    }

    /// Wire value of this error type.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Internal => 1_000_000,
            Self::ResourceLimit => 2_000_000,
            Self::QueryLogic => 3_000_000,
            Self::NonExistence => 3_100_000,
            Self::OpFailed => 4_100_000,
            Self::OpIndeterminate => 4_200_000,
            Self::User => 5_000_000,
            Self::Permission => 6_000_000,
        }
    }
}

/// Notes attached to sequence responses describing changefeed shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseNote {
    /// The sequence is a changefeed over a sequence.
    SequenceFeed,
    /// The sequence is a changefeed over a single document.
    AtomFeed,
    /// The sequence is an `order_by.limit` changefeed.
    OrderByLimitFeed,
    /// The sequence is a union of changefeeds.
    UnionedFeed,
    /// The feed emits state documents.
    IncludesStates,
}

impl ResponseNote {
    /// Create a note from its wire value. Unknown notes are ignored.
    #[must_use]
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::SequenceFeed),
            2 => Some(Self::AtomFeed),
            3 => Some(Self::OrderByLimitFeed),
            4 => Some(Self::UnionedFeed),
            5 => Some(Self::IncludesStates),
            _ => None,
        }
    }

    /// Check whether this note marks a changefeed.
    #[must_use]
    pub fn is_feed(self) -> bool {
        !matches!(self, Self::IncludesStates)
    }
}
