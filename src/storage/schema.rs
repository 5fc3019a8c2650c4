//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use chrono::{DateTime, Utc};
use sea_query::Iden;

/// Delegations table schema.
#[derive(Iden)]
pub enum Delegations {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tzkt_id"]
    TzktId,
    #[iden = "timestamp"]
    Timestamp,
    #[iden = "amount"]
    Amount,
    #[iden = "delegator"]
    Delegator,
    #[iden = "level"]
    Level,
    #[iden = "year"]
    Year,
}

/// PostgreSQL DDL, one statement per entry.
pub const POSTGRES_SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS delegations (
    id BIGSERIAL PRIMARY KEY,
    tzkt_id BIGINT NOT NULL UNIQUE,
    timestamp TIMESTAMPTZ NOT NULL,
    amount BIGINT NOT NULL,
    delegator TEXT NOT NULL,
    level BIGINT NOT NULL,
    year INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_delegations_timestamp ON delegations (timestamp DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_delegations_year_timestamp ON delegations (year, timestamp DESC, id DESC)",
];

/// SQLite DDL, one statement per entry.
///
/// Timestamps are fixed-width RFC3339 text so lexical order is chronological.
pub const SQLITE_SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS delegations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tzkt_id INTEGER NOT NULL UNIQUE,
    timestamp TEXT NOT NULL,
    amount INTEGER NOT NULL,
    delegator TEXT NOT NULL,
    level INTEGER NOT NULL,
    year INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_delegations_timestamp ON delegations (timestamp DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_delegations_year_timestamp ON delegations (year, timestamp DESC, id DESC)",
];

/// Render a timestamp as an inline SQL literal accepted by both backends.
pub fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
