//! Integration tests for the REST presence and health endpoints.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use helpers::TestApp;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let response = app.request("GET", "/api/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_detailed_health_check() {
    let app = TestApp::new();

    let response = app.request("GET", "/api/health/detailed", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let data = &response.body["data"];
    assert_eq!(data["status"], "ok");
    assert_eq!(data["store"], "connected");
    assert_eq!(data["ws_connections"], 0);
    assert_eq!(data["engine"]["bound_sessions"], 0);
    assert!(data["metrics"].get("store_errors").is_some());
}

#[tokio::test]
async fn test_register_creates_offline_record() {
    let app = TestApp::new();

    let response = app
        .request(
            "POST",
            "/api/presence/register",
            Some(json!({ "identity": "alice", "country": "NL" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["identity"], "alice");
    assert_eq!(response.body["data"]["online"], false);
}

#[tokio::test]
async fn test_register_rejects_malformed_identity() {
    let app = TestApp::new();

    let response = app
        .request(
            "POST",
            "/api/presence/register",
            Some(json!({ "identity": "not a name!" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_status_of_unknown_identity_is_404() {
    let app = TestApp::new();

    let response = app.request("GET", "/api/presence/nobody", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_status_of_registered_identity() {
    let app = TestApp::new();
    app.request(
        "POST",
        "/api/presence/register",
        Some(json!({ "identity": "alice" })),
    )
    .await;

    let response = app.request("GET", "/api/presence/alice", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["identity"], "alice");
    assert_eq!(response.body["data"]["online"], false);
}

#[tokio::test]
async fn test_ping_then_offline() {
    let app = TestApp::new();
    app.request(
        "POST",
        "/api/presence/register",
        Some(json!({ "identity": "alice" })),
    )
    .await;

    let ping = app
        .request(
            "POST",
            "/api/presence/ping",
            Some(json!({ "identity": "alice" })),
        )
        .await;
    assert_eq!(ping.status, StatusCode::ACCEPTED);

    // The ping is fresh, so a batch check leaves it alone.
    let verify = app
        .request(
            "POST",
            "/api/presence/verify",
            Some(json!({ "identities": ["alice"] })),
        )
        .await;
    assert_eq!(verify.status, StatusCode::OK);
    assert_eq!(verify.body["data"]["corrected"], json!([]));

    let offline = app
        .request(
            "POST",
            "/api/presence/offline",
            Some(json!({ "identity": "alice" })),
        )
        .await;
    assert_eq!(offline.status, StatusCode::OK);
    assert_eq!(offline.body["data"]["online"], false);
}

#[tokio::test]
async fn test_offline_for_unknown_identity_is_404() {
    let app = TestApp::new();

    let response = app
        .request(
            "POST",
            "/api/presence/offline",
            Some(json!({ "identity": "ghost" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
