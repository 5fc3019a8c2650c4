//! xtz-delegations - Tezos delegation indexer
//!
//! Ingests delegation operations from the TzKT indexer into a SQL store and
//! serves them through a small paginated HTTP API.
//!
//! - [`sync`]: resumable ingestion loop keyed on the stored watermark
//! - [`upstream`]: rate-limited, retrying TzKT client
//! - [`storage`]: idempotent append-only delegation store
//! - [`api`]: `/xtz/delegations` and `/health`
//! - [`runtime`]: task supervision and graceful shutdown

pub mod api;
pub mod config;
pub mod runtime;
pub mod storage;
pub mod sync;
pub mod upstream;
pub mod utils;
