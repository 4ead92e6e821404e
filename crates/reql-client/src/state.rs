//! Connection lifecycle state.

/// Lifecycle state of a connection.
///
/// ```text
/// NotConnected -> Connecting -> Open -> Closing -> Closed
///                      |                              ^
///                      +------(handshake failed)------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection has been established.
    NotConnected,
    /// TCP connect and handshake in progress.
    Connecting,
    /// Handshake done; the reader task is running.
    Open,
    /// Teardown started; outstanding work has been failed.
    Closing,
    /// Socket closed.
    Closed,
}

impl ConnectionState {
    /// Check whether queries can be submitted in this state.
    #[must_use]
    pub fn accepts_queries(self) -> bool {
        self == Self::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotConnected => "not connected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
