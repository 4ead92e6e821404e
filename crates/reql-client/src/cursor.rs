//! Streaming cursors over sequence results.
//!
//! A cursor's rows are pushed in by the connection's reader task and pulled
//! out by [`Cursor::next`]. Continuation batches are requested on demand, with
//! at most one `CONTINUE` in flight per cursor.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures_core::Stream;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use reql_protocol::{Query, Response, ResponseNote, ResponseType};
use reql_types::{Datum, FormatOptions, FromDatum, convert_pseudo};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::deadline::{deadline_after, with_deadline};
use crate::error::{Error, Result, make_error};
use crate::instance::ConnectionInstance;

#[derive(Debug)]
enum Outcome {
    /// More batches may arrive.
    Open,
    /// The last batch has arrived, or the cursor was stopped.
    Exhausted,
    /// The server or the connection failed the cursor.
    Failed(Error),
}

#[derive(Debug)]
struct CursorState {
    buffer: VecDeque<Value>,
    outcome: Outcome,
    /// Requests sent on this token whose response has not arrived yet.
    outstanding: usize,
}

/// What the reader should do after feeding a batch to a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extended {
    /// No more responses are expected; drop the cursor from the table.
    pub finished: bool,
    /// A `CONTINUE` should be sent.
    pub fetch: bool,
}

/// Cursor state shared between the reader task and the user's handle.
#[derive(Debug)]
pub(crate) struct CursorShared {
    query: Query,
    format: FormatOptions,
    prefetch: usize,
    notes: Vec<ResponseNote>,
    state: Mutex<CursorState>,
    new_data: Notify,
}

impl CursorShared {
    /// Create the cursor for `query`, whose first response is still to be
    /// fed through [`extend`](Self::extend).
    pub(crate) fn new(
        query: Query,
        format: FormatOptions,
        prefetch: usize,
        notes: Vec<ResponseNote>,
    ) -> Self {
        Self {
            query,
            format,
            prefetch,
            notes,
            state: Mutex::new(CursorState {
                buffer: VecDeque::new(),
                outcome: Outcome::Open,
                outstanding: 1,
            }),
            new_data: Notify::new(),
        }
    }

    pub(crate) fn token(&self) -> i64 {
        self.query.token
    }

    /// Append a batch and wake waiters.
    pub(crate) fn extend(&self, response: Response) -> Extended {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);

        if matches!(state.outcome, Outcome::Open) {
            match response.response_type {
                ResponseType::SuccessPartial => state.buffer.extend(response.data),
                ResponseType::SuccessSequence => {
                    state.buffer.extend(response.data);
                    state.outcome = Outcome::Exhausted;
                }
                _ => state.outcome = Outcome::Failed(make_error(&response, &self.query)),
            }
        }

        let fetch = self.maybe_fetch_next_batch(&mut state);
        let finished = !matches!(state.outcome, Outcome::Open) && state.outstanding == 0;

        tracing::trace!(
            token = self.query.token,
            buffered = state.buffer.len(),
            finished = finished,
            "cursor extended"
        );

        drop(state);
        self.new_data.notify_waiters();
        Extended { finished, fetch }
    }

    /// Reserve a `CONTINUE` if the buffer is running low.
    ///
    /// An empty buffer always qualifies, whatever the prefetch threshold.
    /// Returns true if the caller must send it.
    fn maybe_fetch_next_batch(&self, state: &mut CursorState) -> bool {
        if matches!(state.outcome, Outcome::Open)
            && state.outstanding == 0
            && state.buffer.len() < self.prefetch.max(1)
        {
            state.outstanding += 1;
            true
        } else {
            false
        }
    }

    /// Reserve a `CONTINUE` regardless of how many rows are buffered.
    pub(crate) fn request_continue(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(state.outcome, Outcome::Open) && state.outstanding == 0 {
            state.outstanding += 1;
            true
        } else {
            false
        }
    }

    /// Undo a reservation whose query could not be written.
    pub(crate) fn request_failed(&self) {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
    }

    /// Mark an open cursor as stopped.
    ///
    /// Returns true if a `STOP` must be sent.
    pub(crate) fn begin_stop(&self) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.outcome, Outcome::Open) {
            return false;
        }
        state.outcome = Outcome::Exhausted;
        state.buffer.clear();
        state.outstanding += 1;
        drop(state);
        self.new_data.notify_waiters();
        true
    }

    /// Fail the cursor, keeping already-buffered rows readable.
    pub(crate) fn close_with_error(&self, message: &str) {
        let mut state = self.state.lock();
        if matches!(state.outcome, Outcome::Open) {
            state.outcome = Outcome::Failed(Error::ConnectionClosed(message.to_string()));
        }
        drop(state);
        self.new_data.notify_waiters();
    }

    fn buffered(&self) -> usize {
        self.state.lock().buffer.len()
    }

    fn is_exhausted(&self) -> bool {
        let state = self.state.lock();
        state.buffer.is_empty() && !matches!(state.outcome, Outcome::Open)
    }
}

enum Step {
    Row(Value),
    Wait,
}

/// Pull the next row, waiting for batches as needed.
async fn next_row(
    shared: &CursorShared,
    conn: &ConnectionInstance,
    deadline: Option<Instant>,
) -> Result<Option<Datum>> {
    loop {
        // Registered before the state check so an extend in between still
        // wakes this wait.
        let notified = shared.new_data.notified();

        let (step, fetch) = {
            let mut state = shared.state.lock();
            match state.buffer.pop_front() {
                Some(row) => {
                    let fetch = shared.maybe_fetch_next_batch(&mut state);
                    (Step::Row(row), fetch)
                }
                None => match &state.outcome {
                    Outcome::Failed(err) => return Err(err.clone()),
                    Outcome::Exhausted => return Ok(None),
                    Outcome::Open => {
                        let fetch = shared.maybe_fetch_next_batch(&mut state);
                        (Step::Wait, fetch)
                    }
                },
            }
        };

        if fetch {
            if let Err(err) = conn.send_query(&Query::continuation(shared.token())).await {
                shared.request_failed();
                match step {
                    Step::Row(_) => {
                        tracing::debug!(token = shared.token(), error = %err, "failed to request next batch");
                    }
                    Step::Wait => return Err(err),
                }
            }
        }

        match step {
            Step::Row(row) => return Ok(Some(convert_pseudo(row, &shared.format)?)),
            Step::Wait => {
                with_deadline(deadline, notified)
                    .await
                    .map_err(|_| Error::QueryTimeout)?;
            }
        }
    }
}

/// A single-pass stream of rows from one query.
///
/// Rows are yielded in the order the server sent them. Dropping a cursor
/// that has not been exhausted stops the query on the server.
pub struct Cursor {
    shared: Arc<CursorShared>,
    conn: Arc<ConnectionInstance>,
    next_fut: Option<BoxFuture<'static, Result<Option<Datum>>>>,
    terminated: bool,
}

impl Cursor {
    pub(crate) fn new(shared: Arc<CursorShared>, conn: Arc<ConnectionInstance>) -> Self {
        Self {
            shared,
            conn,
            next_fut: None,
            terminated: false,
        }
    }

    /// Token of the query this cursor reads.
    #[must_use]
    pub fn token(&self) -> i64 {
        self.shared.token()
    }

    /// Check whether the server marked this sequence as a changefeed.
    #[must_use]
    pub fn is_feed(&self) -> bool {
        self.shared.notes.iter().any(|n| n.is_feed())
    }

    /// Changefeed notes attached to the first batch.
    #[must_use]
    pub fn notes(&self) -> &[ResponseNote] {
        &self.shared.notes
    }

    /// Number of rows buffered and not yet returned.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    /// Check whether every row has been returned and no more will arrive.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.shared.is_exhausted()
    }

    /// Get the next row.
    ///
    /// Returns `Ok(None)` once the sequence is exhausted. If no row is
    /// buffered, waits for the next batch until `timeout` elapses, then fails
    /// with [`Error::QueryTimeout`]; the cursor stays usable after a timeout.
    pub async fn next(&mut self, timeout: Option<Duration>) -> Result<Option<Datum>> {
        self.next_fut = None;
        next_row(&self.shared, &self.conn, deadline_after(timeout)).await
    }

    /// Get the next row converted to `T`.
    pub async fn next_as<T: FromDatum>(&mut self, timeout: Option<Duration>) -> Result<Option<T>> {
        match self.next(timeout).await? {
            Some(row) => Ok(Some(T::from_datum(&row)?)),
            None => Ok(None),
        }
    }

    /// Read every remaining row.
    pub async fn collect_all(mut self) -> Result<Vec<Datum>> {
        let mut rows = Vec::with_capacity(self.buffered());
        while let Some(row) = self.next(None).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stop the query on the server and discard buffered rows.
    ///
    /// Does nothing if the cursor is already exhausted or failed.
    pub async fn close(&mut self) -> Result<()> {
        self.terminated = true;
        if !self.shared.begin_stop() {
            return Ok(());
        }

        tracing::debug!(token = self.token(), "stopping cursor");
        if let Err(err) = self.conn.send_query(&Query::stop(self.token())).await {
            self.shared.request_failed();
            return Err(err);
        }
        Ok(())
    }
}

impl Stream for Cursor {
    type Item = Result<Datum>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }

        let fut = this.next_fut.get_or_insert_with(|| {
            let shared = Arc::clone(&this.shared);
            let conn = Arc::clone(&this.conn);
            Box::pin(async move { next_row(&shared, &conn, None).await })
        });

        let result = ready!(fut.as_mut().poll(cx));
        this.next_fut = None;

        Poll::Ready(match result {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                this.terminated = true;
                None
            }
            Err(err) => {
                this.terminated = true;
                Some(Err(err))
            }
        })
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if !self.shared.begin_stop() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let conn = Arc::clone(&self.conn);
        let token = self.token();
        handle.spawn(async move {
            if let Err(err) = conn.send_query(&Query::stop(token)).await {
                tracing::debug!(token = token, error = %err, "failed to stop dropped cursor");
            }
        });
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("token", &self.token())
            .field("buffered", &self.buffered())
            .finish_non_exhaustive()
    }
}
