//! SQLite delegation store.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::config::StorageConfig;
use crate::storage::Result;

pub use super::sql::sqlite::{Sqlite, SqliteDelegationStore};

impl SqliteDelegationStore {
    /// Open a pool for the configured URI, creating the file if missing.
    ///
    /// An in-memory database lives only as long as its connection, so it is
    /// served by exactly one connection that is never recycled.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.uri)?.create_if_missing(true);

        let pool = if is_in_memory(&config.uri) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .max_lifetime(None)
                .idle_timeout(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqlitePoolOptions::new()
                .max_connections(config.pool.max_connections)
                .acquire_timeout(config.pool.acquire_timeout())
                .connect_with(options)
                .await?
        };

        info!(uri = %config.uri, "Opened SQLite database");
        Ok(Self::new(pool))
    }

    /// Fresh in-memory store with the schema applied. Used by tests.
    pub async fn in_memory() -> Result<Self> {
        let config = StorageConfig {
            storage_type: crate::config::StorageType::Sqlite,
            uri: "sqlite::memory:".to_string(),
            ..StorageConfig::default()
        };
        let store = Self::connect(&config).await?;
        store.init().await?;
        Ok(store)
    }
}

fn is_in_memory(uri: &str) -> bool {
    uri.contains(":memory:") || uri.contains("mode=memory")
}
