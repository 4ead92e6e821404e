//! Table of requests awaiting their first response.

use std::collections::HashMap;

use parking_lot::Mutex;
use reql_protocol::Query;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::result::QueryResult;

/// A submitted query waiting for its response.
///
/// Resolving consumes the request, so each one completes at most once.
#[derive(Debug)]
pub struct PendingRequest {
    query: Query,
    completion: oneshot::Sender<Result<QueryResult>>,
}

impl PendingRequest {
    /// The query this request is waiting on.
    #[must_use]
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Complete the request.
    ///
    /// Returns the result back if the caller stopped waiting.
    pub fn resolve(self, result: Result<QueryResult>) -> std::result::Result<(), Result<QueryResult>> {
        self.completion.send(result)
    }
}

/// Token-keyed table of pending requests.
#[derive(Debug, Default)]
pub struct PendingTable {
    requests: Mutex<HashMap<i64, PendingRequest>>,
}

impl PendingTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `query` under its token and return the completion receiver.
    ///
    /// Fails if the token already has a request in flight.
    pub fn register(&self, query: Query) -> Result<oneshot::Receiver<Result<QueryResult>>> {
        let mut requests = self.requests.lock();
        if requests.contains_key(&query.token) {
            return Err(Error::Driver(format!(
                "Token {} is already in use.",
                query.token
            )));
        }

        let (tx, rx) = oneshot::channel();
        let token = query.token;
        requests.insert(
            token,
            PendingRequest {
                query,
                completion: tx,
            },
        );
        tracing::trace!(token = token, pending = requests.len(), "registered pending request");
        Ok(rx)
    }

    /// Remove the request for `token` so it can be resolved.
    pub fn take(&self, token: i64) -> Option<PendingRequest> {
        self.requests.lock().remove(&token)
    }

    /// Check whether `token` has a request in flight.
    #[must_use]
    pub fn contains(&self, token: i64) -> bool {
        self.requests.lock().contains_key(&token)
    }

    /// Remove every request.
    pub fn drain(&self) -> Vec<PendingRequest> {
        self.requests.lock().drain().map(|(_, r)| r).collect()
    }

    /// Number of requests in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Check whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
