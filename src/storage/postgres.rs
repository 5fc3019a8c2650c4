//! PostgreSQL delegation store.

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::StorageConfig;
use crate::storage::Result;

pub use super::sql::postgres::{Postgres, PostgresDelegationStore};

impl PostgresDelegationStore {
    /// Open a pool using the configured limits.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool.max_connections)
            .min_connections(config.pool.min_connections)
            .max_lifetime(config.pool.max_lifetime())
            .idle_timeout(config.pool.idle_timeout())
            .acquire_timeout(config.pool.acquire_timeout())
            .connect(&config.uri)
            .await?;

        info!(
            max_connections = config.pool.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self::new(pool))
    }
}
