//! Upstream indexer client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Public TzKT mainnet API.
pub const DEFAULT_TZKT_BASE_URL: &str = "https://api.tzkt.io/v1";

/// TzKT client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL, without the `/operations/...` path.
    pub base_url: String,
    /// Total per-request timeout.
    pub timeout_secs: u64,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Requests allowed back-to-back before the rate applies.
    pub burst: u32,
    /// Attempts per fetch, including the first one.
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_backoff_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TZKT_BASE_URL.to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 5,
            requests_per_second: 10.0,
            burst: 5,
            max_attempts: 3,
            initial_backoff_ms: 1_000,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}
