//! Read API.
//!
//! Endpoints:
//! - `GET /xtz/delegations?year=<YYYY>&page=<n>`: newest-first, 50 per page
//! - `GET /health`: storage reachability and uptime

mod error;

pub use error::ApiError;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::storage::{Delegation, DelegationStore};

/// Rows per page of `/xtz/delegations`.
pub const PAGE_SIZE: u64 = 50;

/// Timeout for the storage check in `/health`.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on handling one request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DelegationStore>,
    genesis_year: i32,
    started: Instant,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn DelegationStore>, genesis_year: i32) -> Self {
        Self {
            store,
            genesis_year,
            started: Instant::now(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Build the axum router (separated for testing).
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    let request_timeout = state.request_timeout;

    // Panics become 500s and slow handlers 408s before tracing sees them.
    Router::new()
        .route("/xtz/delegations", get(delegations))
        .route("/health", get(health))
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Raw query parameters; an empty value counts as absent.
#[derive(Debug, Default, Deserialize)]
struct DelegationsQuery {
    year: Option<String>,
    page: Option<String>,
}

/// Validated paging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageRequest {
    year: Option<i32>,
    page: u64,
}

impl PageRequest {
    fn parse(query: &DelegationsQuery, genesis_year: i32) -> Result<Self, ApiError> {
        let year = match non_empty(&query.year) {
            None => None,
            Some(raw) => match raw.parse::<i32>() {
                Ok(year) if year >= genesis_year => Some(year),
                _ => return Err(ApiError::BadRequest("invalid year".to_string())),
            },
        };

        let page = match non_empty(&query.page) {
            None => 1,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(ApiError::BadRequest("invalid page".to_string())),
            },
        };

        Ok(Self { year, page })
    }

    fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

async fn delegations(
    State(state): State<AppState>,
    Query(query): Query<DelegationsQuery>,
) -> Result<Json<DelegationsResponse>, ApiError> {
    let request = PageRequest::parse(&query, state.genesis_year)?;

    let rows = state
        .store
        .page(request.year, PAGE_SIZE, request.offset())
        .await?;

    Ok(Json(DelegationsResponse {
        data: rows.iter().map(DelegationView::from).collect(),
    }))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();

    let healthy = match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, state.store.ping()).await {
        Ok(Ok(())) => {
            checks.insert("database", "healthy".to_string());
            true
        }
        Ok(Err(e)) => {
            warn!(error = %e, "health check: storage ping failed");
            checks.insert("database", format!("unhealthy: {}", e));
            false
        }
        Err(_) => {
            warn!("health check: storage ping timed out");
            checks.insert("database", "unhealthy: timed out".to_string());
            false
        }
    };

    let open = state.store.open_connections();
    if open > 0 {
        checks.insert("database_connections", format!("{} open", open));
    }

    let (status, code) = if healthy {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        code,
        Json(HealthResponse {
            status,
            checks,
            uptime: format_uptime(state.started.elapsed()),
        }),
    )
}

/// Round to whole seconds and render as `1h2m3s`, `4m5s` or `6s`.
fn format_uptime(elapsed: Duration) -> String {
    let secs = (elapsed.as_millis() + 500) / 1000;
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct DelegationsResponse {
    data: Vec<DelegationView>,
}

/// Wire shape of one delegation; numbers are rendered as strings.
#[derive(Debug, Serialize)]
struct DelegationView {
    timestamp: String,
    amount: String,
    delegator: String,
    level: String,
}

impl From<&Delegation> for DelegationView {
    fn from(d: &Delegation) -> Self {
        Self {
            timestamp: d.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            amount: d.amount.to_string(),
            delegator: d.delegator.clone(),
            level: d.level.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, String>,
    uptime: String,
}

#[cfg(test)]
mod tests;
