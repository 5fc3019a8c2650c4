//! Outbound request limiter using the token bucket algorithm.
//!
//! Tokens refill continuously at `rate` per second up to `burst`. The bucket
//! starts full. Every outbound upstream attempt, retries included, takes one
//! token.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::shutdown::ShutdownSignal;

/// Pure token bucket. Callers supply the clock so the arithmetic is testable.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket. `rate` is tokens per second; `burst` is capacity.
    pub fn new(rate: f64, burst: u32, now: Instant) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate: rate.max(f64::MIN_POSITIVE),
            burst,
            tokens: burst,
            last_refill: now,
        }
    }

    /// Take one token, or return how long until one is available.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.rate))
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        self.last_refill = now;
    }

    /// Current available tokens. Useful for diagnostics.
    pub fn available_tokens(&self) -> f64 {
        self.tokens
    }
}

/// Shared limiter for one upstream endpoint.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
}

/// Shutdown fired while waiting for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limiter wait cancelled")]
pub struct AcquireCancelled;

impl RateLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(rate, burst, Instant::now())),
        }
    }

    /// Wait until a token is available, or until shutdown.
    pub async fn acquire(&self, shutdown: &ShutdownSignal) -> Result<(), AcquireCancelled> {
        loop {
            if shutdown.is_cancelled() {
                return Err(AcquireCancelled);
            }

            let wait = {
                let mut bucket = self
                    .bucket
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match bucket.try_acquire(Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(AcquireCancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
