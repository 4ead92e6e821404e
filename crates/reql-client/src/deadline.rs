//! Absolute deadlines for async operations.
//!
//! A deadline is computed once at the call boundary and then shared by every
//! wait that call performs, so retries and re-armed waits never extend it.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio::time::error::Elapsed;

/// Convert a relative timeout into an absolute deadline.
#[must_use]
pub fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}

/// Race `fut` against `deadline`.
///
/// With no deadline the future is awaited as-is. Expiry only stops the
/// caller from waiting; `fut` is dropped and nothing else is cancelled.
pub async fn with_deadline<F>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await,
        None => Ok(fut.await),
    }
}
