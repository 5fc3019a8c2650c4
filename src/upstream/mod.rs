//! Upstream indexer client.
//!
//! [`DelegationSource`] is the seam the sync engine depends on; [`TzktClient`]
//! is the production implementation against the TzKT REST API.

mod tzkt;

pub use tzkt::TzktClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::utils::shutdown::ShutdownSignal;

/// Errors raised by a fetch.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected upstream status {0}")]
    Status(reqwest::StatusCode),

    #[error("Malformed upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream request failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<UpstreamError>,
    },

    #[error("Upstream fetch cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Transient failures worth another attempt: transport errors, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Http(_) => true,
            UpstreamError::Status(status) => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            _ => false,
        }
    }

    /// HTTP status of the final failed attempt, if the upstream answered.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            UpstreamError::Status(status) => Some(*status),
            UpstreamError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Delegating account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub address: String,
}

/// A delegation operation as returned by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DelegationEvent {
    /// Upstream operation id.
    pub id: i64,
    pub level: i64,
    pub timestamp: DateTime<Utc>,
    /// Stake in mutez.
    pub amount: i64,
    #[serde(default)]
    pub sender: Option<Sender>,
}

impl DelegationEvent {
    /// Delegator address, empty when the indexer omitted the sender.
    pub fn delegator(&self) -> &str {
        self.sender.as_ref().map_or("", |sender| sender.address.as_str())
    }
}

/// Source of delegation events.
#[async_trait]
pub trait DelegationSource: Send + Sync {
    /// Fetch up to `limit` events strictly after `since`, ascending by id.
    async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
        shutdown: &ShutdownSignal,
    ) -> Result<Vec<DelegationEvent>, UpstreamError>;
}
