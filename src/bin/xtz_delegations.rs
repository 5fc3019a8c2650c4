//! xtz-delegations: Tezos delegation indexer
//!
//! Polls the TzKT API for new delegation operations, stores them, and serves
//! them newest-first over HTTP.
//!
//! ## Architecture
//! ```text
//! [TzKT API] -> [sync engine] -> [Postgres/SQLite] <- [read API :8080]
//! ```
//!
//! ## Configuration
//! - `--config <path>` or XTZ_CONFIG: YAML config file
//! - XTZ_*: overrides, e.g. XTZ_SYNC__BATCH_SIZE=500
//! - DB_DSN, HTTP_ADDR, TZKT_BASE_URL, HTTP_CLIENT_TIMEOUT, POLLER_INTERVAL,
//!   POLLER_BATCH_SIZE: legacy overrides
//! - XTZ_LOG / XTZ_LOG_FORMAT: log filter and format

use tracing::{error, info};

use xtz_delegations::config::Config;
use xtz_delegations::runtime;
use xtz_delegations::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!(
        backend = %config.storage.storage_type,
        addr = %config.server.bind_addr(),
        upstream = %config.upstream.base_url,
        batch_size = config.sync.batch_size,
        "Starting xtz-delegations"
    );

    if let Err(e) = runtime::run(config).await {
        error!(error = %e, "xtz-delegations exited with error");
        return Err(e.into());
    }

    info!("xtz-delegations stopped");
    Ok(())
}
