//! Retry utilities: bounded attempt loops and conflict backoff.
//!
//! Uses `backon` for exponential backoff with jitter when a storage write
//! loses a race. [`bounded_attempts`] is the plain "try N times" combinator
//! used where retrying is part of the algorithm rather than error recovery.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::error::StorageError;

/// Result of one attempt inside [`bounded_attempts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Done(T),
    Retry,
}

/// Run `op` up to `max_attempts` times until it yields [`Attempt::Done`].
///
/// `op` receives the 0-based attempt number. Returns `Ok(None)` once every
/// attempt asked for a retry; an `Err` from `op` stops immediately.
pub async fn bounded_attempts<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    for attempt in 0..max_attempts {
        if let Attempt::Done(value) = op(attempt).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Backoff for storage conflicts (lock contention, identifier races).
///
/// - Min delay: 5ms
/// - Max delay: 500ms
/// - Max attempts: 8
/// - Jitter enabled
pub fn conflict_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(500))
        .with_max_times(8)
        .with_jitter()
}

/// Run a storage operation, transparently retrying retryable errors.
pub async fn retry_on_conflict<T, F, Fut>(operation: &str, op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    op.retry(conflict_backoff())
        .when(StorageError::is_retryable)
        .notify(|err: &StorageError, delay: Duration| {
            warn!(operation, error = %err, ?delay, "Retrying after storage conflict");
        })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_bounded_attempts_stops_on_done() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<u32>, ()> = bounded_attempts(10, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(if attempt == 2 {
                    Attempt::Done(attempt)
                } else {
                    Attempt::Retry
                })
            }
        })
        .await;

        assert_eq!(result, Ok(Some(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bounded_attempts_exhausts() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, ()> = bounded_attempts(10, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Attempt::Retry) }
        })
        .await;

        assert_eq!(result, Ok(None));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_bounded_attempts_propagates_error() {
        let calls = AtomicU32::new(0);
        let result: Result<Option<()>, &str> = bounded_attempts(10, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("storage down") }
        })
        .await;

        assert_eq!(result, Err("storage down"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_recovers() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StorageError::Conflict("database is locked".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_does_not_retry_fatal() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Corrupt("bad plan".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::Corrupt(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
