use axum::body::Body;
use chrono::{TimeZone, Utc};
use http::Request;
use tower::ServiceExt;

use super::*;
use crate::storage::{MockDelegationStore, NewDelegation};

async fn fetch_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn app_with(store: Arc<MockDelegationStore>) -> Router {
    router(AppState::new(store, 2018))
}

fn row(tzkt_id: i64, year: i32, month: u32) -> NewDelegation {
    NewDelegation {
        tzkt_id,
        timestamp: Utc.with_ymd_and_hms(year, month, 1, 12, 30, 45).unwrap(),
        amount: 1_234_567,
        delegator: format!("tz1row{}", tzkt_id),
        level: 100 + tzkt_id,
    }
}

#[tokio::test]
async fn test_delegations_response_format() {
    let store = Arc::new(MockDelegationStore::new());
    store.bulk_write(&[row(1, 2019, 3)]).await.unwrap();

    let (status, json) = fetch_json(app_with(store), "/xtz/delegations").await;

    assert_eq!(status, StatusCode::OK);
    let item = &json["data"][0];
    assert_eq!(item["timestamp"], "2019-03-01T12:30:45Z");
    assert_eq!(item["amount"], "1234567");
    assert_eq!(item["delegator"], "tz1row1");
    assert_eq!(item["level"], "101");
}

#[tokio::test]
async fn test_empty_store_returns_empty_array() {
    let store = Arc::new(MockDelegationStore::new());

    let (status, json) = fetch_json(app_with(store), "/xtz/delegations").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_year_filter_and_newest_first() {
    let store = Arc::new(MockDelegationStore::new());
    store
        .bulk_write(&[row(1, 2018, 8), row(2, 2019, 1), row(3, 2019, 6), row(4, 2020, 2)])
        .await
        .unwrap();

    let (status, json) = fetch_json(app_with(store), "/xtz/delegations?year=2019").await;

    assert_eq!(status, StatusCode::OK);
    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["delegator"], "tz1row3");
    assert_eq!(data[1]["delegator"], "tz1row2");
}

#[tokio::test]
async fn test_pagination() {
    let store = Arc::new(MockDelegationStore::new());
    let rows: Vec<NewDelegation> = (1..=60)
        .map(|i| NewDelegation {
            tzkt_id: i,
            timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(i),
            amount: i,
            delegator: format!("tz1page{}", i),
            level: i,
        })
        .collect();
    store.bulk_write(&rows).await.unwrap();

    let (_, first) = fetch_json(app_with(store.clone()), "/xtz/delegations").await;
    let (_, second) = fetch_json(app_with(store.clone()), "/xtz/delegations?page=2").await;
    let (_, third) = fetch_json(app_with(store), "/xtz/delegations?page=3").await;

    assert_eq!(first["data"].as_array().unwrap().len(), 50);
    assert_eq!(first["data"][0]["level"], "60");
    assert_eq!(second["data"].as_array().unwrap().len(), 10);
    assert_eq!(second["data"][0]["level"], "10");
    assert!(third["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_params_are_absent() {
    let store = Arc::new(MockDelegationStore::new());
    store.bulk_write(&[row(1, 2019, 3)]).await.unwrap();

    let (status, json) = fetch_json(app_with(store), "/xtz/delegations?year=&page=").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_params_rejected_before_storage() {
    let cases = [
        ("/xtz/delegations?page=0", "invalid page"),
        ("/xtz/delegations?page=-1", "invalid page"),
        ("/xtz/delegations?page=abc", "invalid page"),
        ("/xtz/delegations?year=abc", "invalid year"),
        ("/xtz/delegations?year=2017", "invalid year"),
        ("/xtz/delegations?year=20l9&page=1", "invalid year"),
    ];

    for (uri, message) in cases {
        let store = Arc::new(MockDelegationStore::new());
        let (status, json) = fetch_json(app_with(store.clone()), uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["error"], "bad_request", "{}", uri);
        assert_eq!(json["message"], message, "{}", uri);
        assert_eq!(store.calls(), 0, "{} must not reach storage", uri);
    }
}

#[tokio::test]
async fn test_storage_failure_is_internal_error() {
    let store = Arc::new(MockDelegationStore::new());
    store.set_fail_on_page(true).await;

    let (status, json) = fetch_json(app_with(store), "/xtz/delegations").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "internal_error");
}

#[tokio::test]
async fn test_health_ok() {
    let store = Arc::new(MockDelegationStore::new());

    let (status, json) = fetch_json(app_with(store), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["database"], "healthy");
    assert_eq!(json["checks"]["database_connections"], "1 open");
    assert_eq!(json["uptime"], "0s");
}

#[tokio::test]
async fn test_health_unavailable_when_storage_down() {
    let store = Arc::new(MockDelegationStore::new());
    store.set_fail_on_ping(true).await;

    let (status, json) = fetch_json(app_with(store), "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
    assert!(json["checks"]["database"]
        .as_str()
        .unwrap()
        .starts_with("unhealthy: "));
}

#[tokio::test]
async fn test_cors_preflight() {
    let store = Arc::new(MockDelegationStore::new());
    let req = Request::builder()
        .method("OPTIONS")
        .uri("/xtz/delegations")
        .header("Origin", "https://example.com")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();

    let resp = app_with(store).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "*"
    );
}

#[test]
fn test_format_uptime() {
    assert_eq!(format_uptime(Duration::from_millis(400)), "0s");
    assert_eq!(format_uptime(Duration::from_millis(2_600)), "3s");
    assert_eq!(format_uptime(Duration::from_secs(125)), "2m5s");
    assert_eq!(format_uptime(Duration::from_secs(3_600)), "1h0m0s");
    assert_eq!(format_uptime(Duration::from_secs(3_723)), "1h2m3s");
}

#[test]
fn test_page_request_offset() {
    let request = PageRequest::parse(
        &DelegationsQuery {
            year: Some("2020".to_string()),
            page: Some("3".to_string()),
        },
        2018,
    )
    .unwrap();
    assert_eq!(request.year, Some(2020));
    assert_eq!(request.offset(), 100);
}

/// Store whose reads either panic or never finish in time.
enum BrokenStore {
    Panics,
    Hangs,
}

#[async_trait::async_trait]
impl DelegationStore for BrokenStore {
    async fn bulk_write(&self, _rows: &[NewDelegation]) -> crate::storage::Result<()> {
        Ok(())
    }

    async fn watermark(&self) -> crate::storage::Result<crate::storage::Watermark> {
        Ok(crate::storage::Watermark::empty())
    }

    async fn page(
        &self,
        _year: Option<i32>,
        _limit: u64,
        _offset: u64,
    ) -> crate::storage::Result<Vec<Delegation>> {
        match self {
            BrokenStore::Panics => panic!("page blew up"),
            BrokenStore::Hangs => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn ping(&self) -> crate::storage::Result<()> {
        Ok(())
    }

    fn open_connections(&self) -> u32 {
        0
    }
}

#[tokio::test]
async fn test_handler_panic_is_internal_error() {
    let app = router(AppState::new(Arc::new(BrokenStore::Panics), 2018));
    let req = Request::builder()
        .uri("/xtz/delegations")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn test_slow_request_times_out() {
    let app = router(
        AppState::new(Arc::new(BrokenStore::Hangs), 2018)
            .with_request_timeout(Duration::from_secs(1)),
    );
    let req = Request::builder()
        .uri("/xtz/delegations")
        .body(Body::empty())
        .unwrap();

    let resp = app.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_health_omits_connections_when_pool_empty() {
    let (status, json) = fetch_json(
        router(AppState::new(Arc::new(BrokenStore::Hangs), 2018)),
        "/health",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["checks"].get("database_connections").is_none());
}
