//! A single open connection and its response demultiplexer.
//!
//! The instance owns the socket. Its write half is shared by every task that
//! submits queries; its read half belongs to one reader task that routes each
//! incoming frame by token to either a live cursor or a pending request.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use parking_lot::Mutex;
use reql_codec::{
    Connection as FramedConnection, DEFAULT_MAX_HANDSHAKE_REPLY, Frame, FrameCodec, FrameReader,
    FrameSender, buffered, handshake,
};
use reql_protocol::{Handshake, Query, Response, ResponseType};
use reql_types::{FormatOptions, convert_pseudo};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::cursor::{Cursor, CursorShared};
use crate::deadline::with_deadline;
use crate::error::{Error, Result, make_error};
use crate::pending::{PendingRequest, PendingTable};
use crate::result::QueryResult;
use crate::state::ConnectionState;

/// A byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

type BoxTransport = Box<dyn Transport>;

const CLOSED: &str = "Connection is closed.";

fn closed_message(cause: Option<&Error>) -> String {
    match cause {
        Some(err) => format!("Connection is closed ({err})."),
        None => CLOSED.to_string(),
    }
}

pub(crate) struct ConnectionInstance {
    addr: String,
    sender: FrameSender<BoxTransport>,
    pending: PendingTable,
    cursors: Mutex<HashMap<i64, Arc<CursorShared>>>,
    closing: AtomicBool,
    closed: AtomicBool,
    shutdown: Arc<Notify>,
    reader: Mutex<Option<JoinHandle<()>>>,
    cursor_prefetch: usize,
}

impl ConnectionInstance {
    /// Connect over TCP and run the handshake, all under one deadline.
    pub(crate) async fn connect(config: &Config, deadline: Option<Instant>) -> Result<Arc<Self>> {
        let addr = format!("{}:{}", config.host, config.port);

        tracing::debug!(addr = %addr, "establishing TCP connection");

        let stream = match with_deadline(
            deadline,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::Driver(format!(
                    "Could not connect to {addr}. Error: {e}"
                )));
            }
            Err(_) => return Err(Error::ConnectionTimeout),
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }

        Self::open(Box::new(stream), addr, config, deadline).await
    }

    /// Run the handshake over an established transport and start the reader.
    pub(crate) async fn open(
        stream: BoxTransport,
        addr: String,
        config: &Config,
        deadline: Option<Instant>,
    ) -> Result<Arc<Self>> {
        let mut stream = buffered(stream);
        let greeting = Handshake::new(config.auth_key.clone());

        let reply = match with_deadline(
            deadline,
            handshake(&mut stream, &greeting, DEFAULT_MAX_HANDSHAKE_REPLY),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                return Err(Error::Driver(format!(
                    "Connection interrupted during handshake with {addr}. Error: {e}"
                )));
            }
            Err(_) => return Err(Error::ConnectionTimeout),
        };

        if !reply.is_success() {
            // Nothing is registered yet: just drop the socket.
            drop(stream);
            tracing::warn!(addr = %addr, reply = reply.message(), "server rejected handshake");
            return Err(Error::Driver(format!(
                "Server dropped connection with message: \"{}\"",
                reply.message()
            )));
        }

        let codec = FrameCodec::new().with_max_frame_size(config.max_frame_size);
        let stream: BoxTransport = Box::new(stream);
        let (reader, sender) = FramedConnection::with_codec(stream, codec).into_split();
        let shutdown = Arc::new(Notify::new());

        let instance = Arc::new(Self {
            addr,
            sender,
            pending: PendingTable::new(),
            cursors: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown: Arc::clone(&shutdown),
            reader: Mutex::new(None),
            cursor_prefetch: config.cursor_prefetch,
        });

        let handle = tokio::spawn(read_loop(Arc::downgrade(&instance), reader, shutdown));
        *instance.reader.lock() = Some(handle);

        tracing::info!(addr = %instance.addr, "connection established");
        Ok(instance)
    }

    /// Check whether the socket is still open.
    pub(crate) fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else if self.closing.load(Ordering::Acquire) {
            ConnectionState::Closing
        } else {
            ConnectionState::Open
        }
    }

    /// Write a query frame.
    pub(crate) async fn send_query(&self, query: &Query) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ConnectionClosed(CLOSED.to_string()));
        }

        let payload = query.encode();
        tracing::debug!(
            token = query.token,
            query_type = ?query.query_type,
            length = payload.len(),
            "sending query"
        );
        self.sender.send(Frame::new(query.token, payload)).await?;
        Ok(())
    }

    /// Submit a query.
    ///
    /// With `noreply` the query is only written. Otherwise the caller waits
    /// for the response until `deadline`; on expiry the request stays
    /// registered so a late response is still routed.
    pub(crate) async fn run(
        &self,
        query: Query,
        noreply: bool,
        deadline: Option<Instant>,
    ) -> Result<QueryResult> {
        if self.closing.load(Ordering::Acquire) {
            return Err(Error::ConnectionClosed(CLOSED.to_string()));
        }
        self.run_unchecked(query, noreply, deadline).await
    }

    async fn run_unchecked(
        &self,
        query: Query,
        noreply: bool,
        deadline: Option<Instant>,
    ) -> Result<QueryResult> {
        if noreply {
            self.send_query(&query).await?;
            return Ok(QueryResult::Empty);
        }

        let token = query.token;
        if self.cursors.lock().contains_key(&token) {
            return Err(Error::Driver(format!("Token {token} is already in use.")));
        }

        // Registered before writing so the response cannot beat the entry.
        let frame = Frame::new(token, query.encode());
        let completion = self.pending.register(query)?;

        tracing::debug!(token = token, length = frame.payload.len(), "sending query");
        if let Err(e) = self.sender.send(frame).await {
            self.pending.take(token);
            return Err(e.into());
        }

        match with_deadline(deadline, completion).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed(CLOSED.to_string())),
            Err(_) => {
                tracing::debug!(token = token, "query timed out");
                Err(Error::QueryTimeout)
            }
        }
    }

    /// Request the next batch for a live cursor, if none is in flight.
    pub(crate) async fn continue_cursor(&self, token: i64) -> Result<()> {
        let Some(cursor) = self.cursors.lock().get(&token).cloned() else {
            return Ok(());
        };
        if cursor.request_continue() {
            if let Err(e) = self.send_query(&Query::continuation(token)).await {
                cursor.request_failed();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop a live cursor.
    pub(crate) async fn stop_cursor(&self, token: i64) -> Result<()> {
        let Some(cursor) = self.cursors.lock().get(&token).cloned() else {
            return Ok(());
        };
        if cursor.begin_stop() {
            if let Err(e) = self.send_query(&Query::stop(token)).await {
                cursor.request_failed();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Every cursor and pending request is failed and both tables are
    /// cleared before the optional `NOREPLY_WAIT` is sent under `token`.
    /// That wait is bounded by `deadline`; the socket is closed either way.
    /// Calling this again is a no-op.
    pub(crate) async fn close(
        &self,
        noreply_wait: bool,
        token: i64,
        cause: Option<&Error>,
        deadline: Option<Instant>,
    ) -> Result<()> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let reason = closed_message(cause);
        let (pending, cursors) = self.fail_outstanding(&reason);
        tracing::info!(
            addr = %self.addr,
            pending = pending,
            cursors = cursors,
            reason = %reason,
            "closing connection"
        );

        let result = if noreply_wait {
            self.run_unchecked(Query::noreply_wait(token), false, deadline)
                .await
                .map(drop)
        } else {
            Ok(())
        };

        if let Err(e) = self.sender.close().await {
            tracing::debug!(error = %e, "ignoring error while closing socket");
        }
        self.closed.store(true, Ordering::Release);
        self.shutdown.notify_one();

        result
    }

    /// Fail and remove every cursor and pending request.
    fn fail_outstanding(&self, reason: &str) -> (usize, usize) {
        let cursors: Vec<_> = self.cursors.lock().drain().map(|(_, c)| c).collect();
        let pending = self.pending.drain();
        let counts = (pending.len(), cursors.len());

        for cursor in cursors {
            cursor.close_with_error(reason);
        }
        for request in pending {
            let _ = request.resolve(Err(Error::ConnectionClosed(reason.to_string())));
        }

        counts
    }

    /// Route one frame.
    ///
    /// An error here invalidates the whole stream.
    fn dispatch(self: &Arc<Self>, frame: Frame) -> Result<()> {
        let token = frame.token;
        let response = Response::decode(token, &frame.payload)?;

        tracing::debug!(
            token = token,
            response_type = ?response.response_type,
            rows = response.data.len(),
            "received response"
        );

        let cursor = self.cursors.lock().get(&token).cloned();
        if let Some(cursor) = cursor {
            let extended = cursor.extend(response);
            if extended.finished {
                self.cursors.lock().remove(&token);
                tracing::debug!(token = token, "cursor finished");
            }
            if extended.fetch {
                self.spawn_continue(token);
            }
            return Ok(());
        }

        if let Some(request) = self.pending.take(token) {
            self.resolve(request, response);
            return Ok(());
        }

        if self.closing.load(Ordering::Acquire) {
            tracing::debug!(token = token, "ignoring response while closing");
            return Ok(());
        }

        tracing::warn!(token = token, "response for unknown token");
        Err(Error::Driver("Unexpected response received.".into()))
    }

    fn resolve(self: &Arc<Self>, request: PendingRequest, response: Response) {
        let token = response.token;
        let query = request.query();
        let wants_profile = query.wants_profile();
        let profile = response.profile.clone();

        let result = match response.response_type {
            ResponseType::SuccessAtom | ResponseType::ServerInfo => {
                Self::atom(query, response).map(QueryResult::Value)
            }
            ResponseType::SuccessSequence | ResponseType::SuccessPartial => {
                self.open_cursor(query, response).map(QueryResult::Cursor)
            }
            ResponseType::WaitComplete => Ok(QueryResult::Empty),
            _ => Err(make_error(&response, query)),
        };
        let result = result.map(|r| r.maybe_profile(profile, wants_profile));

        if request.resolve(result).is_err() {
            // Dropping an unclaimed cursor stops it on the server.
            tracing::debug!(token = token, "response arrived after caller stopped waiting");
        }
    }

    fn atom(query: &Query, response: Response) -> Result<reql_types::Datum> {
        let format = FormatOptions::from_options(&query.options)?;
        let value = response.data.into_iter().next().ok_or_else(|| {
            reql_protocol::ProtocolError::MalformedPayload("atom response without data".into())
        })?;
        Ok(convert_pseudo(value, &format)?)
    }

    fn open_cursor(self: &Arc<Self>, query: &Query, response: Response) -> Result<Cursor> {
        let format = FormatOptions::from_options(&query.options)?;
        let token = query.token;
        let shared = Arc::new(CursorShared::new(
            query.clone(),
            format,
            self.cursor_prefetch,
            response.notes.clone(),
        ));

        let extended = shared.extend(response);
        if !extended.finished {
            self.cursors.lock().insert(token, Arc::clone(&shared));
        }
        if extended.fetch {
            self.spawn_continue(token);
        }

        tracing::debug!(token = token, finished = extended.finished, "cursor opened");
        Ok(Cursor::new(shared, Arc::clone(self)))
    }

    fn spawn_continue(self: &Arc<Self>, token: i64) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = conn.send_query(&Query::continuation(token)).await {
                tracing::debug!(token = token, error = %e, "failed to request next batch");
            }
        });
    }

    async fn reader_finished(&self, failure: Option<Error>) {
        if let Some(err) = failure {
            if self.closing.load(Ordering::Acquire) {
                tracing::debug!(error = %err, "reader stopped while closing");
            } else {
                tracing::warn!(addr = %self.addr, error = %err, "connection failed");
                if let Err(e) = self.close(false, 0, Some(&err), None).await {
                    tracing::debug!(error = %e, "error during teardown");
                }
            }
        }

        // Anything registered while the close was in progress.
        self.fail_outstanding(CLOSED);
        self.closed.store(true, Ordering::Release);
        tracing::debug!(addr = %self.addr, "reader task finished");
    }
}

impl Drop for ConnectionInstance {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInstance")
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// The demultiplexer: reads frames until shutdown or failure.
///
/// Holds only a weak reference between frames so that dropping every handle
/// to the connection also ends this task.
async fn read_loop(
    instance: Weak<ConnectionInstance>,
    mut reader: FrameReader<ReadHalf<BoxTransport>>,
    shutdown: Arc<Notify>,
) {
    let failure = loop {
        let frame = tokio::select! {
            biased;
            () = shutdown.notified() => break None,
            frame = reader.next() => frame,
        };

        let Some(conn) = instance.upgrade() else {
            return;
        };

        let result = match frame {
            Some(Ok(frame)) => conn.dispatch(frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(reql_codec::CodecError::ConnectionClosed.into()),
        };

        if let Err(e) = result {
            break Some(e);
        }
    };

    if let Some(conn) = instance.upgrade() {
        conn.reader_finished(failure).await;
    }
}
