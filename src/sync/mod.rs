//! Ingestion loop.
//!
//! Each iteration reads the watermark from storage, fetches the next batch of
//! delegations strictly after it, and writes the accepted ones back. The loop
//! backfills history and then keeps polling; there is no separate mode.
//!
//! ```text
//! Idle -> Fetching -> Writing -> Sleeping(interval) -> Idle
//!            |           |
//!            +-----------+-----> Sleeping(backoff) -> Idle
//! ```
//!
//! A full batch that wrote rows skips the sleep. Failed iterations never stop the loop; only
//! shutdown does.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::storage::{DelegationStore, NewDelegation, StorageError};
use crate::upstream::{DelegationEvent, DelegationSource, UpstreamError};
use crate::utils::retry::sync_backoff;
use crate::utils::shutdown::ShutdownSignal;

/// Errors from a single iteration. Always recoverable.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to read watermark: {0}")]
    Watermark(#[source] StorageError),

    #[error("Failed to fetch delegations: {0}")]
    Fetch(#[source] UpstreamError),

    #[error("Failed to write delegations: {0}")]
    Write(#[source] StorageError),
}

impl SyncError {
    fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Fetch(UpstreamError::Cancelled))
    }
}

/// Why the engine is sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sleep {
    /// Caught up or partial batch: wait the poll interval.
    Interval(Duration),
    /// Last iteration failed.
    Backoff(Duration),
}

impl Sleep {
    pub fn duration(&self) -> Duration {
        match self {
            Sleep::Interval(d) | Sleep::Backoff(d) => *d,
        }
    }
}

/// Engine state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Writing,
    Sleeping(Sleep),
}

/// Result of one successful iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Lower bound (exclusive) the batch was fetched after.
    pub since: DateTime<Utc>,
    /// Events returned by the upstream.
    pub fetched: usize,
    /// Events handed to storage after discarding empty delegators.
    pub written: usize,
}

impl SyncOutcome {
    /// More is likely waiting upstream and the watermark moved, so the next
    /// fetch can start right away.
    pub fn is_full(&self, batch_size: usize) -> bool {
        self.fetched == batch_size && self.written > 0
    }
}

/// Failure backoff for the loop: poll interval, doubling, capped.
///
/// Reset after every successful iteration.
pub struct LoopBackoff {
    builder: ExponentialBuilder,
    delays: ExponentialBackoff,
    max: Duration,
}

impl LoopBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let builder = sync_backoff(base, max);
        Self {
            delays: builder.build(),
            builder,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.delays.next().unwrap_or(self.max)
    }

    pub fn reset(&mut self) {
        self.delays = self.builder.build();
    }
}

/// Drives the upstream into the store.
pub struct SyncEngine {
    source: Arc<dyn DelegationSource>,
    store: Arc<dyn DelegationStore>,
    config: SyncConfig,
    state: SyncState,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn DelegationSource>,
        store: Arc<dyn DelegationStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            config,
            state: SyncState::Idle,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Sync state transition");
            self.state = next;
        }
    }

    /// Where the next fetch starts: the watermark, clamped up to genesis.
    async fn resume_point(&self) -> Result<DateTime<Utc>, SyncError> {
        let watermark = self.store.watermark().await.map_err(SyncError::Watermark)?;
        if watermark.is_empty() || watermark.timestamp < self.config.genesis {
            Ok(self.config.genesis)
        } else {
            Ok(watermark.timestamp)
        }
    }

    /// Run one fetch/write iteration.
    pub async fn sync_once(&mut self, shutdown: &ShutdownSignal) -> Result<SyncOutcome, SyncError> {
        let since = self.resume_point().await?;

        self.transition(SyncState::Fetching);
        let events = self
            .source
            .fetch(since, self.config.batch_size, shutdown)
            .await
            .map_err(SyncError::Fetch)?;

        let fetched = events.len();
        if fetched == 0 {
            debug!(since = %since, "Caught up, nothing new");
            return Ok(SyncOutcome {
                since,
                fetched,
                written: 0,
            });
        }

        let rows = accepted_rows(events);
        let written = rows.len();
        if written < fetched {
            debug!(discarded = fetched - written, "Discarded delegations without delegator");
        }

        if !rows.is_empty() {
            self.transition(SyncState::Writing);
            self.store
                .bulk_write(&rows)
                .await
                .map_err(SyncError::Write)?;
        }

        info!(since = %since, fetched, written, "Synced delegations batch");
        Ok(SyncOutcome {
            since,
            fetched,
            written,
        })
    }

    /// Loop until shutdown.
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        let poll_interval = self.config.poll_interval();
        let mut backoff = LoopBackoff::new(poll_interval, self.config.max_backoff());

        info!(
            batch_size = self.config.batch_size,
            poll_interval_secs = poll_interval.as_secs(),
            genesis = %self.config.genesis,
            "Sync engine started"
        );

        while !shutdown.is_cancelled() {
            self.transition(SyncState::Idle);

            let sleep = match self.sync_once(&shutdown).await {
                Ok(outcome) => {
                    backoff.reset();
                    if outcome.is_full(self.config.batch_size) {
                        None
                    } else {
                        Some(Sleep::Interval(poll_interval))
                    }
                }
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!(error = %e, backoff_ms = %delay.as_millis(), "Sync iteration failed");
                    Some(Sleep::Backoff(delay))
                }
            };

            if let Some(sleep) = sleep {
                self.transition(SyncState::Sleeping(sleep));
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(sleep.duration()) => {}
                }
            }
        }

        self.transition(SyncState::Idle);
        info!("Sync engine stopped");
    }
}

fn accepted_rows(events: Vec<DelegationEvent>) -> Vec<NewDelegation> {
    events
        .into_iter()
        .filter(|event| !event.delegator().is_empty())
        .map(|event| NewDelegation {
            tzkt_id: event.id,
            timestamp: event.timestamp,
            amount: event.amount,
            delegator: event.delegator().to_string(),
            level: event.level,
        })
        .collect()
}
