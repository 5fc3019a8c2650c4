//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod server;
mod storage;
mod sync;
mod upstream;

pub use server::ServerConfig;
pub use storage::{PoolConfig, StorageConfig, StorageType};
pub use sync::{mainnet_genesis, SyncConfig};
pub use upstream::{UpstreamConfig, DEFAULT_TZKT_BASE_URL};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "XTZ_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "XTZ";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "XTZ_LOG";
/// Environment variable selecting the log output format (`text` or `json`).
pub const LOG_FORMAT_ENV_VAR: &str = "XTZ_LOG_FORMAT";

/// Legacy environment variable for the database connection string.
pub const DB_DSN_ENV_VAR: &str = "DB_DSN";
/// Legacy environment variable for the HTTP listen address (`host:port`).
pub const HTTP_ADDR_ENV_VAR: &str = "HTTP_ADDR";
/// Legacy environment variable for the TzKT API base URL.
pub const TZKT_BASE_URL_ENV_VAR: &str = "TZKT_BASE_URL";
/// Legacy environment variable for the upstream request timeout.
pub const HTTP_CLIENT_TIMEOUT_ENV_VAR: &str = "HTTP_CLIENT_TIMEOUT";
/// Legacy environment variable for the poll interval.
pub const POLLER_INTERVAL_ENV_VAR: &str = "POLLER_INTERVAL";
/// Legacy environment variable for the fetch batch size.
pub const POLLER_BATCH_SIZE_ENV_VAR: &str = "POLLER_BATCH_SIZE";

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Read API server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Upstream indexer client configuration.
    pub upstream: UpstreamConfig,
    /// Sync engine configuration.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    ///    (`XTZ_SYNC__BATCH_SIZE=500`)
    /// 5. Legacy variables (`DB_DSN`, `HTTP_ADDR`, `TZKT_BASE_URL`,
    ///    `HTTP_CLIENT_TIMEOUT`, `POLLER_INTERVAL`, `POLLER_BATCH_SIZE`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let legacy = LegacyEnv::from_env();
        builder = builder
            .set_override_option("storage.uri", legacy.db_dsn)?
            .set_override_option("server.host", legacy.http_host)?
            .set_override_option("server.port", legacy.http_port)?
            .set_override_option("upstream.base_url", legacy.tzkt_base_url)?
            .set_override_option("upstream.timeout_secs", legacy.http_client_timeout_secs)?
            .set_override_option("sync.poll_interval_secs", legacy.poller_interval_secs)?
            .set_override_option("sync.batch_size", legacy.poller_batch_size)?;

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.uri must not be empty".into()));
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid("sync.batch_size must be positive".into()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sync.poll_interval_secs must be positive".into(),
            ));
        }
        if self.sync.max_backoff_secs < self.sync.poll_interval_secs {
            return Err(ConfigError::Invalid(
                "sync.max_backoff_secs must be at least sync.poll_interval_secs".into(),
            ));
        }
        if self.upstream.requests_per_second <= 0.0 || self.upstream.burst == 0 {
            return Err(ConfigError::Invalid(
                "upstream rate limit must allow at least one request".into(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be positive".into(),
            ));
        }
        if self.upstream.max_attempts == 0 {
            return Err(ConfigError::Invalid("upstream.max_attempts must be positive".into()));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.storage_type = StorageType::Sqlite;
        config.storage.uri = "sqlite::memory:".to_string();
        config
    }
}

/// Values read from the environment variable names the service used before
/// the `XTZ_` prefix existed.
#[derive(Debug, Default)]
struct LegacyEnv {
    db_dsn: Option<String>,
    http_host: Option<String>,
    http_port: Option<i64>,
    tzkt_base_url: Option<String>,
    http_client_timeout_secs: Option<i64>,
    poller_interval_secs: Option<i64>,
    poller_batch_size: Option<i64>,
}

impl LegacyEnv {
    fn from_env() -> Self {
        let mut legacy = Self {
            db_dsn: std::env::var(DB_DSN_ENV_VAR).ok(),
            tzkt_base_url: std::env::var(TZKT_BASE_URL_ENV_VAR).ok(),
            ..Self::default()
        };

        if let Ok(addr) = std::env::var(HTTP_ADDR_ENV_VAR) {
            match parse_listen_addr(&addr) {
                Some((host, port)) => {
                    legacy.http_host = Some(host);
                    legacy.http_port = Some(i64::from(port));
                }
                None => warn!(var = HTTP_ADDR_ENV_VAR, value = %addr, "Ignoring unparseable listen address"),
            }
        }

        legacy.http_client_timeout_secs = duration_var(HTTP_CLIENT_TIMEOUT_ENV_VAR);
        legacy.poller_interval_secs = duration_var(POLLER_INTERVAL_ENV_VAR);

        if let Ok(raw) = std::env::var(POLLER_BATCH_SIZE_ENV_VAR) {
            match raw.trim().parse::<i64>() {
                Ok(size) => legacy.poller_batch_size = Some(size),
                Err(_) => warn!(var = POLLER_BATCH_SIZE_ENV_VAR, value = %raw, "Ignoring non-numeric batch size"),
            }
        }

        legacy
    }
}

fn duration_var(var: &str) -> Option<i64> {
    let raw = std::env::var(var).ok()?;
    match parse_duration(&raw) {
        Some(duration) => i64::try_from(duration.as_secs().max(1)).ok(),
        None => {
            warn!(var, value = %raw, "Ignoring unparseable duration");
            None
        }
    }
}

/// Parse `host:port`; an empty host (`:8080`) binds all interfaces.
pub(crate) fn parse_listen_addr(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port = port.parse().ok()?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Some((host.to_string(), port))
}

/// Parse a short duration string: `500ms`, `15s`, `2m`, `1h`, or bare seconds.
pub(crate) fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);
    let value: u64 = value.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(value)),
        "ms" => Some(Duration::from_millis(value)),
        "m" => Some(Duration::from_secs(value.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(value.checked_mul(3600)?)),
        _ => None,
    }
}
