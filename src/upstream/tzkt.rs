//! TzKT REST client.
//!
//! `GET <base>/operations/delegations?timestamp.gt=..&sort.asc=id&limit=..&status=applied`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use super::{DelegationEvent, DelegationSource, UpstreamError};
use crate::config::{UpstreamConfig, DEFAULT_TZKT_BASE_URL};
use crate::utils::rate_limit::RateLimiter;
use crate::utils::retry::{fetch_backoff, retry_with_backoff, RetryError};
use crate::utils::shutdown::ShutdownSignal;

const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Rate-limited, retrying TzKT client.
pub struct TzktClient {
    client: Client,
    endpoint: Url,
    limiter: RateLimiter,
    max_attempts: usize,
    initial_backoff: Duration,
}

impl TzktClient {
    /// Create a client. An empty base URL falls back to the public mainnet API.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base = match config.base_url.trim() {
            "" => DEFAULT_TZKT_BASE_URL,
            base => base,
        };
        let endpoint = Url::parse(&format!(
            "{}/operations/delegations",
            base.trim_end_matches('/')
        ))
        .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", base, e)))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(TCP_KEEPALIVE)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            limiter: RateLimiter::new(config.requests_per_second, config.burst),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
        })
    }

    /// Request URL for one fetch.
    pub fn request_url(&self, since: DateTime<Utc>, limit: usize) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(
                "timestamp.gt",
                &since.to_rfc3339_opts(SecondsFormat::Secs, true),
            )
            .append_pair("sort.asc", "id")
            .append_pair("limit", &limit.to_string())
            .append_pair("status", "applied");
        url
    }

    /// One rate-limited attempt: wait for a token, send, check status, decode.
    async fn attempt(
        &self,
        url: &Url,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<DelegationEvent>, UpstreamError> {
        self.limiter
            .acquire(shutdown)
            .await
            .map_err(|_| UpstreamError::Cancelled)?;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status.as_u16() >= 300 {
            return Err(UpstreamError::Status(status));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DelegationSource for TzktClient {
    async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<DelegationEvent>, UpstreamError> {
        let url = self.request_url(since, limit);
        debug!(%url, "Fetching delegations");

        let result = retry_with_backoff(
            fetch_backoff(self.initial_backoff, self.max_attempts),
            shutdown,
            UpstreamError::is_retryable,
            || self.attempt(&url, shutdown),
        )
        .await;

        match result {
            Ok(events) => {
                debug!(count = events.len(), since = %since, "Fetched delegations");
                Ok(events)
            }
            Err(RetryError::Permanent(e)) => Err(e),
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "Upstream retries exhausted");
                Err(UpstreamError::RetriesExhausted {
                    attempts,
                    source: Box::new(last),
                })
            }
            Err(RetryError::Cancelled) => Err(UpstreamError::Cancelled),
        }
    }
}
