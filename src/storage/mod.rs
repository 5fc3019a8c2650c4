//! Durable record of ingested delegations.
//!
//! The table is append-only: rows are created once by the sync engine and
//! never updated. The resume point for ingestion is derived from the rows
//! themselves (see [`DelegationStore::watermark`]); there is no checkpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};

pub mod mock;
pub mod schema;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use mock::MockDelegationStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDelegationStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDelegationStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query build error: {0}")]
    QueryBuild(#[from] sea_query::error::Error),

    #[error("Storage backend '{0}' requested but its feature is not enabled")]
    BackendDisabled(StorageType),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A delegation about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDelegation {
    /// Upstream operation id; the idempotency key.
    pub tzkt_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Stake in mutez.
    pub amount: i64,
    pub delegator: String,
    pub level: i64,
}

impl NewDelegation {
    /// Calendar year of the timestamp, stored alongside the row for filtering.
    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }
}

/// A persisted delegation as served by the read API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// Surrogate sequence id; tie-breaker for equal timestamps.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub amount: i64,
    pub delegator: String,
    pub level: i64,
}

/// Latest durably ingested point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub timestamp: DateTime<Utc>,
    /// Informational only; fetches are keyed on the timestamp.
    pub level: i64,
}

impl Watermark {
    /// Sentinel returned when the store holds no rows.
    pub const fn empty() -> Self {
        Self {
            timestamp: DateTime::UNIX_EPOCH,
            level: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

/// Interface for delegation persistence.
///
/// Implementations:
/// - `PostgresDelegationStore`: production storage
/// - `SqliteDelegationStore`: local runs and tests
/// - `MockDelegationStore`: in-memory, with failure injection
#[async_trait]
pub trait DelegationStore: Send + Sync {
    /// Write a batch atomically. Rows whose `tzkt_id` already exists are
    /// skipped. An empty batch is a no-op.
    async fn bulk_write(&self, rows: &[NewDelegation]) -> Result<()>;

    /// Maximum timestamp and level across all rows, or [`Watermark::empty`].
    async fn watermark(&self) -> Result<Watermark>;

    /// Newest-first page, optionally restricted to one calendar year.
    ///
    /// Ordered by timestamp descending, then surrogate id descending.
    async fn page(&self, year: Option<i32>, limit: u64, offset: u64) -> Result<Vec<Delegation>>;

    /// Cheap round-trip to the backend.
    async fn ping(&self) -> Result<()>;

    /// Connections currently held by the pool.
    fn open_connections(&self) -> u32;
}

/// Initialize storage based on configuration.
///
/// Connects the pool and creates the schema. Failure here is fatal to the
/// process.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn DelegationStore>> {
    info!(backend = %config.storage_type, "Initializing storage");

    match config.storage_type {
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let store = PostgresDelegationStore::connect(config).await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let store = SqliteDelegationStore::connect(config).await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[allow(unreachable_patterns)]
        other => {
            error!(backend = %other, "Storage backend not compiled in");
            Err(StorageError::BackendDisabled(other))
        }
    }
}
