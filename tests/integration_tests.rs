// Integration tests: HTTP surface over the in-memory engine

mod common;

use axum_test::TestServer;
use common::*;
use pingwatch::config::AppConfig;
use pingwatch::models::{ContainerInfo, Ping};
use pingwatch::ping_repo::{
    MemoryPingRepo, PingAggregateParams, PingGetParams, PingRepository, RepoError,
};
use pingwatch::routes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[database]
engine = "memory"
path = ""
max_pool_size = 2
query_timeout_ms = 5000
"#;

fn test_server() -> TestServer {
    let config = AppConfig::load_from_str(TEST_CONFIG).unwrap();
    let app = routes::app(Arc::new(MemoryPingRepo::new()), config);
    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = test_server();
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("pingwatch"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_put_then_get_pings() {
    let server = test_server();

    let batch = vec![ping(1, 10, true), ping(2, 20, false)];
    let response = server.put("/pings").json(&batch).await;
    response.assert_status_ok();

    let response = server.get("/pings").await;
    response.assert_status_ok();
    let got: Vec<Ping> = response.json();
    // Newest first by default.
    assert_eq!(keys(&got), vec![ping(2, 20, false).key(), ping(1, 10, true).key()]);
}

#[tokio::test]
async fn test_get_pings_with_filters_and_paging() {
    let server = test_server();
    server.put("/pings").json(&mixed_corpus()).await.assert_status_ok();

    let response = server
        .get("/pings")
        .add_query_param("container_ip", "10.0.0.3")
        .add_query_param("success", "true")
        .add_query_param("oldest_first", "true")
        .add_query_param("limit", "2")
        .await;
    response.assert_status_ok();
    let got: Vec<Ping> = response.json();
    assert!(got.len() <= 2);
    for p in &got {
        assert_eq!(p.container_ip, ip(3));
        assert!(p.success);
    }
}

#[tokio::test]
async fn test_get_pings_rejects_malformed_address() {
    let server = test_server();
    let response = server
        .get("/pings")
        .add_query_param("container_ip", "not-an-ip")
        .await;
    response.assert_status_bad_request();
    let json: serde_json::Value = response.json();
    assert!(json.get("error").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_get_pings_rejects_negative_limit() {
    let server = test_server();
    let response = server.get("/pings").add_query_param("limit", "-1").await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_put_pings_rejects_malformed_body() {
    let server = test_server();
    let response = server
        .put("/pings")
        .content_type("application/json")
        .text(r#"{"not": "an array"}"#)
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_aggregate_omits_absent_last_success() {
    let server = test_server();
    server
        .put("/pings")
        .json(&vec![ping(1, 1, true), ping(2, 2, false), ping(1, 3, true)])
        .await
        .assert_status_ok();

    let response = server
        .get("/pings/aggregate")
        .add_query_param("sort_property", "last_success")
        .add_query_param("sort_order", "asc")
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);

    // 10.0.0.2 never succeeded: sorts first, last_success key omitted entirely.
    assert_eq!(rows[0].get("ip").and_then(|v| v.as_str()), Some("10.0.0.2"));
    assert!(rows[0].get("last_ping").is_some());
    assert!(rows[0].get("last_success").is_none());
    assert_eq!(rows[1].get("ip").and_then(|v| v.as_str()), Some("10.0.0.1"));
    assert!(rows[1].get("last_success").is_some());
}

#[tokio::test]
async fn test_aggregate_rejects_unknown_sort_property() {
    let server = test_server();
    let response = server
        .get("/pings/aggregate")
        .add_query_param("sort_property", "favourite_colour")
        .await;
    response.assert_status_bad_request();
}

#[tokio::test]
async fn test_aggregate_with_cutoff_param() {
    let server = test_server();
    server
        .put("/pings")
        .json(&vec![ping(1, 5, true), ping(2, 10, true)])
        .await
        .assert_status_ok();

    let response = server
        .get("/pings/aggregate")
        .add_query_param(
            "ping_before",
            at(10).to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        )
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("ip").and_then(|v| v.as_str()), Some("10.0.0.1"));
}

/// Repository that never answers; forces the deadline path in the handlers.
struct StalledRepo;

#[async_trait::async_trait]
impl PingRepository for StalledRepo {
    async fn get(
        &self,
        _ctx: &CancellationToken,
        _params: PingGetParams,
    ) -> Result<Vec<Ping>, RepoError> {
        std::future::pending().await
    }

    async fn put(&self, _ctx: &CancellationToken, _pings: &[Ping]) -> Result<(), RepoError> {
        std::future::pending().await
    }

    async fn aggregate(
        &self,
        _ctx: &CancellationToken,
        _params: PingAggregateParams,
    ) -> Result<Vec<ContainerInfo>, RepoError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_query_deadline_maps_to_service_unavailable() {
    let tight = TEST_CONFIG.replace("query_timeout_ms = 5000", "query_timeout_ms = 20");
    let config = AppConfig::load_from_str(&tight).unwrap();
    let app = routes::app(Arc::new(StalledRepo), config);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/pings").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = response.json();
    let message = json.get("error").and_then(|v| v.as_str()).unwrap();
    assert!(message.contains("cancelled"));

    let response = server.get("/pings/aggregate").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let response = server.put("/pings").json(&vec![ping(1, 0, true)]).await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_empty_store_returns_empty_arrays() {
    let server = test_server();
    let response = server.get("/pings").await;
    response.assert_status_ok();
    let got: Vec<Ping> = response.json();
    assert!(got.is_empty());

    let response = server.get("/pings/aggregate").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert!(json.as_array().unwrap().is_empty());
}
