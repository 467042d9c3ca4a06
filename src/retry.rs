//! Transient-error retry helper (spec.md §7 Policy).
//!
//! Wraps a fallible async operation with exponential backoff, retrying only
//! errors the operation classifies as transient via [`Error::is_retryable`].
//! Logical errors (not found, quota exceeded, unordered data, ...) return
//! immediately on the first attempt.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::{Error, Result};

/// Retry `op` with exponential backoff until it succeeds, returns a
/// non-retryable error, or `max_backoff` elapses.
pub async fn with_retry<T, F, Fut>(max_backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_backoff),
        ..ExponentialBackoff::default()
    };

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
            Err(err) => return Err(err),
        }
    }
}
