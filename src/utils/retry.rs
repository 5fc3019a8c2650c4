//! Retry utilities: backoff builders and a cancellable retry loop.
//!
//! Uses `backon` for exponential backoff. Jitter is disabled so delays are
//! predictable and testable under a paused clock.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::warn;

use super::shutdown::ShutdownSignal;

/// Backoff between attempts of a single upstream fetch.
///
/// - Min delay: `initial` (doubles per retry)
/// - Max attempts: `attempts` total, so `attempts - 1` retries
/// - No jitter
pub fn fetch_backoff(initial: Duration, attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(initial)
        .with_factor(2.0)
        .with_max_delay(initial.saturating_mul(1 << attempts.min(16)))
        .with_max_times(attempts.saturating_sub(1))
}

/// Backoff between failed sync iterations.
///
/// - Min delay: `base` (the poll interval)
/// - Max delay: `max`
/// - Unbounded attempts; callers rebuild the iterator after a success
pub fn sync_backoff(base: Duration, max: Duration) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(base)
        .with_factor(2.0)
        .with_max_delay(max)
        .without_max_times()
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was classified as not worth retrying.
    Permanent(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: usize, last: E },
    /// Shutdown fired while an attempt or a backoff sleep was in progress.
    Cancelled,
}

/// Run `op` until it succeeds, fails permanently, exhausts `backoff`, or
/// `shutdown` fires.
///
/// Both the attempt and the sleep between attempts race the shutdown signal,
/// so cancellation is observed within one scheduling step.
pub async fn retry_with_backoff<T, E, B, F, Fut, R>(
    backoff: B,
    shutdown: &ShutdownSignal,
    is_retryable: R,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    B: BackoffBuilder,
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut delays = backoff.build();
    let mut attempts = 0usize;

    loop {
        if shutdown.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempts += 1;

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            result = op() => result,
        };

        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable(&e) => return Err(RetryError::Permanent(e)),
            Err(e) => e,
        };

        let Some(delay) = delays.next() else {
            return Err(RetryError::Exhausted {
                attempts,
                last: error,
            });
        };

        warn!(
            attempt = attempts,
            error = %error,
            backoff_ms = %delay.as_millis(),
            "Attempt failed, retrying after backoff"
        );

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
