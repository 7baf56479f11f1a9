//! Health Check API Tests

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::new();

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_liveness_check() {
    let app = TestApp::new();

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_in_memory_store() {
    let app = TestApp::new();

    let response = app.server.get("/health/ready").await;

    response.assert_status(StatusCode::OK);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["store"]["backend"], "memory");
    assert_eq!(json["checks"]["attachments"]["status"], "healthy");
    assert_eq!(json["checks"]["gateway"]["active_connections"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_engine_metrics() {
    let app = TestApp::new();
    app.server.get("/health").await;

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("chat_engine_http_requests_total"));
}
