//! Public connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use reql_protocol::Query;
use reql_types::Datum;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::deadline::deadline_after;
use crate::error::{Error, Result};
use crate::instance::{ConnectionInstance, Transport};
use crate::result::QueryResult;
use crate::state::ConnectionState;

/// Term type of `r.db(...)`, used for the default database option.
const TERM_DB: u64 = 14;

/// A connection to a RethinkDB server.
///
/// Queries may be issued from any number of tasks at once; their responses
/// are matched back to them by token. The underlying socket can be replaced
/// with [`reconnect`](Self::reconnect) without invalidating the handle.
///
/// # Example
///
/// ```rust,ignore
/// use reql_client::{Config, Connection};
/// use serde_json::{json, Map};
///
/// let conn = Connection::connect(Config::new().host("localhost")).await?;
/// let tables = conn.start(json!([62, []]), Map::new()).await?.into_value()?;
/// ```
pub struct Connection {
    config: Config,
    instance: Mutex<Option<Arc<ConnectionInstance>>>,
    database: Mutex<Option<String>>,
    next_token: AtomicI64,
    connecting: AtomicBool,
}

impl Connection {
    /// Create a handle without connecting.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let database = config.database.clone();
        Self {
            config,
            instance: Mutex::new(None),
            database: Mutex::new(database),
            next_token: AtomicI64::new(1),
            connecting: AtomicBool::new(false),
        }
    }

    /// Connect to the server described by `config`.
    pub async fn connect(config: Config) -> Result<Self> {
        let timeout = config.timeouts.connect_timeout;
        let conn = Self::new(config);
        conn.reconnect(false, timeout).await?;
        Ok(conn)
    }

    /// Run the connection over an already-established transport.
    ///
    /// The handshake is performed on `transport`. A handle created this way
    /// reconnects over TCP.
    pub async fn connect_with<T: Transport>(transport: T, config: Config) -> Result<Self> {
        let deadline = deadline_after(config.timeouts.connect_timeout);
        let addr = format!("{}:{}", config.host, config.port);
        let instance = ConnectionInstance::open(Box::new(transport), addr, &config, deadline).await?;

        let conn = Self::new(config);
        *conn.instance.lock() = Some(instance);
        Ok(conn)
    }

    /// Close the current socket, if any, and open a new one.
    ///
    /// `timeout` bounds the whole call, including the `noreply_wait` on the
    /// old socket.
    pub async fn reconnect(&self, noreply_wait: bool, timeout: Option<Duration>) -> Result<()> {
        let deadline = deadline_after(timeout);
        self.close_until(noreply_wait, deadline).await?;

        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            "connecting to RethinkDB"
        );

        self.connecting.store(true, Ordering::Release);
        let result = ConnectionInstance::connect(&self.config, deadline).await;
        self.connecting.store(false, Ordering::Release);

        *self.instance.lock() = Some(result?);
        Ok(())
    }

    /// Close the connection.
    ///
    /// With `noreply_wait`, first waits for every `noreply` query to finish.
    /// Outstanding queries and cursors fail with a "connection is closed"
    /// error. Closing a closed connection does nothing.
    /// The `noreply_wait` is bounded by the configured query timeout.
    pub async fn close(&self, noreply_wait: bool) -> Result<()> {
        self.close_until(noreply_wait, self.query_deadline()).await
    }

    async fn close_until(
        &self,
        noreply_wait: bool,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<()> {
        let Some(instance) = self.instance() else {
            return Ok(());
        };
        let token = self.next_token();
        instance.close(noreply_wait, token, None, deadline).await
    }

    /// Wait until every `noreply` query sent so far has been processed.
    pub async fn noreply_wait(&self) -> Result<()> {
        let Some(instance) = self.instance() else {
            return Ok(());
        };
        let query = Query::noreply_wait(self.next_token());
        instance.run(query, false, self.query_deadline()).await?;
        Ok(())
    }

    /// Ask the server to identify itself.
    pub async fn server(&self) -> Result<Datum> {
        let instance = self.require_instance()?;
        let query = Query::server_info(self.next_token());
        instance
            .run(query, false, self.query_deadline())
            .await?
            .into_value()
    }

    /// Change the default database for subsequent queries.
    pub fn use_db(&self, database: impl Into<String>) {
        *self.database.lock() = Some(database.into());
    }

    /// The default database, if one is set.
    #[must_use]
    pub fn database(&self) -> Option<String> {
        self.database.lock().clone()
    }

    /// Start a query.
    ///
    /// `term` is the serialized term tree and `options` its global optional
    /// arguments. The default database is added as `db` unless `options`
    /// already names one. With `noreply: true` the query is only written and
    /// [`QueryResult::Empty`] is returned.
    pub async fn start(&self, term: Value, mut options: Map<String, Value>) -> Result<QueryResult> {
        let instance = self.require_instance()?;

        if !options.contains_key("db") {
            if let Some(db) = self.database() {
                options.insert("db".into(), json!([TERM_DB, [db]]));
            }
        }

        let query = Query::start(self.next_token(), term, options);
        let noreply = query.is_noreply();
        instance.run(query, noreply, self.query_deadline()).await
    }

    /// Request the next batch of the cursor started under `token`.
    pub async fn continue_query(&self, token: i64) -> Result<()> {
        match self.instance() {
            Some(instance) => instance.continue_cursor(token).await,
            None => Ok(()),
        }
    }

    /// Stop the cursor started under `token`.
    pub async fn stop(&self, token: i64) -> Result<()> {
        match self.instance() {
            Some(instance) => instance.stop_cursor(token).await,
            None => Ok(()),
        }
    }

    /// Check if the socket is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.instance().is_some_and(|i| i.is_open())
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.connecting.load(Ordering::Acquire) {
            return ConnectionState::Connecting;
        }
        match self.instance() {
            Some(instance) => instance.state(),
            None => ConnectionState::NotConnected,
        }
    }

    /// Allocate a query token.
    pub fn next_token(&self) -> i64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Connection configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn instance(&self) -> Option<Arc<ConnectionInstance>> {
        self.instance.lock().clone()
    }

    fn require_instance(&self) -> Result<Arc<ConnectionInstance>> {
        self.instance()
            .ok_or_else(|| Error::ConnectionClosed("Connection is closed.".into()))
    }

    fn query_deadline(&self) -> Option<tokio::time::Instant> {
        deadline_after(self.config.timeouts.query_timeout)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
