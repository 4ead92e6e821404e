//! Client configuration.

use std::time::Duration;

use reql_protocol::DEFAULT_MAX_FRAME_SIZE;

use crate::error::Error;

/// Default server port for client connections.
pub const DEFAULT_PORT: u16 = 28015;

/// Timeout configuration.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Time to connect and complete the handshake (default: 20s).
    pub connect_timeout: Option<Duration>,
    /// Time to wait for a query's first response (default: none).
    pub query_timeout: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(20)),
            query_timeout: None,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the query timeout.
    #[must_use]
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Wait indefinitely for connections and queries.
    #[must_use]
    pub fn no_timeouts() -> Self {
        Self {
            connect_timeout: None,
            query_timeout: None,
        }
    }
}

/// Configuration for connecting to a ReQL server.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future releases without breaking semver. Use [`Config::default()`]
/// or [`Config::from_connection_string()`] to construct instances.
#[derive(Clone)]
#[non_exhaustive]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 28015).
    pub port: u16,

    /// Default database for queries that do not name one.
    pub database: Option<String>,

    /// Authentication key sent in the handshake (may be empty).
    pub auth_key: String,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request the next cursor batch when fewer rows than this are buffered.
    /// An empty buffer always triggers a request, so 0 behaves like 1.
    pub cursor_prefetch: usize,

    /// Largest frame payload accepted from the server.
    pub max_frame_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: None,
            auth_key: String::new(),
            timeouts: TimeoutConfig::default(),
            cursor_prefetch: 1,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("auth_key", &if self.auth_key.is_empty() { "" } else { "***" })
            .field("timeouts", &self.timeouts)
            .field("cursor_prefetch", &self.cursor_prefetch)
            .field("max_frame_size", &self.max_frame_size)
            .finish()
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// ```text
    /// Host=localhost;Port=28015;Db=blog;AuthKey=secret;Connect Timeout=5
    /// ```
    ///
    /// Keys are case-insensitive. Timeouts are in seconds; `0` disables the
    /// timeout. Unknown keys are ignored.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, Error> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" => {
                    if let Some((host, port)) = value.rsplit_once(':') {
                        config.host = host.to_string();
                        config.port = parse_port(port)?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => {
                    config.port = parse_port(value)?;
                }
                "db" | "database" => {
                    config.database = (!value.is_empty()).then(|| value.to_string());
                }
                "authkey" | "auth key" | "auth_key" => {
                    config.auth_key = value.to_string();
                }
                "connect timeout" | "timeout" => {
                    config.timeouts.connect_timeout = parse_timeout(value)?;
                }
                "query timeout" => {
                    config.timeouts.query_timeout = parse_timeout(value)?;
                }
                "prefetch" | "cursor prefetch" => {
                    config.cursor_prefetch = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid prefetch: {value}")))?;
                }
                "max frame size" => {
                    config.max_frame_size = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid max frame size: {value}")))?;
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the default database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the authentication key.
    #[must_use]
    pub fn auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect_timeout = Some(timeout);
        self
    }

    /// Set the cursor prefetch threshold.
    #[must_use]
    pub fn cursor_prefetch(mut self, rows: usize) -> Self {
        self.cursor_prefetch = rows;
        self
    }

    /// Set the largest accepted frame payload.
    #[must_use]
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }
}

fn parse_port(value: &str) -> Result<u16, Error> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid port: {value}")))
}

fn parse_timeout(value: &str) -> Result<Option<Duration>, Error> {
    let secs: f64 = value
        .parse()
        .map_err(|_| Error::Config(format!("invalid timeout: {value}")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::Config(format!("invalid timeout: {value}")));
    }
    Ok((secs > 0.0).then(|| Duration::from_secs_f64(secs)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.cursor_prefetch, 1);
        assert_eq!(config.timeouts.connect_timeout, Some(Duration::from_secs(20)));
        assert!(config.timeouts.query_timeout.is_none());
    }

    #[test]
    fn test_connection_string() {
        let config = Config::from_connection_string(
            "Host=db.internal;Port=28016;Db=blog;AuthKey=s3cret;Connect Timeout=5;Prefetch=50",
        )
        .unwrap();

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 28016);
        assert_eq!(config.database.as_deref(), Some("blog"));
        assert_eq!(config.auth_key, "s3cret");
        assert_eq!(config.timeouts.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.cursor_prefetch, 50);
    }

    #[test]
    fn test_connection_string_host_with_port() {
        let config = Config::from_connection_string("server=10.0.0.1:29015").unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 29015);
    }

    #[test]
    fn test_connection_string_zero_timeout_disables() {
        let config = Config::from_connection_string("Connect Timeout=0;Query Timeout=1.5").unwrap();
        assert!(config.timeouts.connect_timeout.is_none());
        assert_eq!(config.timeouts.query_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_connection_string_errors() {
        assert!(matches!(
            Config::from_connection_string("Port=abc"),
            Err(Error::Config(_))
        ));
        assert!(Config::from_connection_string("Host").is_err());
        assert!(Config::from_connection_string("Connect Timeout=-1").is_err());
    }

    #[test]
    fn test_connection_string_ignores_unknown_keys() {
        let config = Config::from_connection_string("Host=a;Flavor=vanilla;").unwrap();
        assert_eq!(config.host, "a");
    }

    #[test]
    fn test_debug_hides_auth_key() {
        let config = Config::new().auth_key("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
