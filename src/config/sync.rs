//! Sync engine configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Unix timestamp of 2018-06-30T00:00:00Z, the first day of Tezos mainnet.
const MAINNET_GENESIS_UNIX: i64 = 1_530_316_800;

/// Earliest timestamp the sync engine will ever ask the upstream for.
pub fn mainnet_genesis() -> DateTime<Utc> {
    DateTime::from_timestamp(MAINNET_GENESIS_UNIX, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum events requested per fetch.
    pub batch_size: usize,
    /// Sleep between polls once caught up; also the base failure backoff.
    pub poll_interval_secs: u64,
    /// Upper bound for the failure backoff.
    pub max_backoff_secs: u64,
    /// Genesis floor: the watermark is clamped up to this value.
    pub genesis: DateTime<Utc>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            poll_interval_secs: 15,
            max_backoff_secs: 120,
            genesis: mainnet_genesis(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}
