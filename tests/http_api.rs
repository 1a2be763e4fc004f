/// HTTP surface tests: routes, status codes and JSON shapes
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use growth_audit::audit_client::AuditClient;
use growth_audit::config::Config;
use growth_audit::handlers::{self, AppState};
use growth_audit::storage::Storage;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn app_for(server: &MockServer) -> Router {
    Mock::given(method("POST"))
        .and(path("/webhook/aiGrowth/startAudit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auditId": "abc123"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/aiGrowth/bolt"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let config = Config {
        audit_api_base_url: format!("{}/webhook/", server.uri()),
        ..Default::default()
    };
    let client = AuditClient::from_config(&config).unwrap();
    let state = Arc::new(AppState::new(config, Storage::in_memory(), client));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(handlers::api_routes())
        .with_state(state)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "memory");
}

#[tokio::test]
async fn test_session_lifecycle_over_http() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    let (status, opened) = call(
        &app,
        "POST",
        "/api/v1/sessions",
        Some(json!({"query": "?utm_source=google&utm_campaign=spring"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["step"], json!({"kind": "step", "step": "welcome"}));
    let id = opened["sessionId"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    let (status, started) = call(&app, "POST", &format!("/api/v1/sessions/{}/start", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["auditId"], "abc123");
    assert_eq!(started["step"]["step"], "websiteUrl");

    let (status, answered) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/answer", id),
        Some(json!({"value": "example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["answers"]["websiteUrl"]["answer"], "https://example.com");
    assert_eq!(answered["answers"]["websiteUrl"]["hasWebsite"], true);
    assert_eq!(answered["progress"], json!({"index": 2, "total": 12}));

    let (status, error) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/answer", id),
        Some(json!({"value": "not-an-email"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error["error"].is_string());

    let (_, view) = call(&app, "GET", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(view["step"]["step"], "email");

    let (status, back) = call(&app, "POST", &format!("/api/v1/sessions/{}/back", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(back["step"]["step"], "websiteUrl");
}

#[tokio::test]
async fn test_resumed_session_keeps_attribution() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    call(
        &app,
        "POST",
        "/api/v1/sessions",
        Some(json!({"sessionId": "browser-42", "query": "utm_source=newsletter"})),
    )
    .await;
    let (status, resumed) = call(
        &app,
        "POST",
        "/api/v1/sessions",
        Some(json!({"sessionId": "browser-42"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["sessionId"], "browser-42");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    let (status, _) = call(&app, "GET", "/api/v1/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_jump_is_forbidden_without_dev_navigation() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    let (_, opened) = call(&app, "POST", "/api/v1/sessions", Some(json!({}))).await;
    let id = opened["sessionId"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/jump", id),
        Some(json!({"index": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_prefill_on_non_enriched_step_is_bad_request() {
    let mock_server = MockServer::start().await;
    let app = app_for(&mock_server).await;

    let (_, opened) = call(&app, "POST", "/api/v1/sessions", Some(json!({}))).await;
    let id = opened["sessionId"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "GET", &format!("/api/v1/sessions/{}/prefill", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", &format!("/api/v1/sessions/{}/results", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
