//! Coordinator web API.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{advisor, entry, model_provider, EchoAgent};
use finadvisor::web::{create_app_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer};

fn app(entries: Vec<finadvisor::AgentEntry>) -> axum::Router {
    let advisor = Arc::new(advisor(entries, Some(model_provider()), 0));
    create_app_router(Arc::new(AppState::new(advisor)))
}

async fn call(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_advise(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/advise")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app(vec![entry("budget", "http://127.0.0.1:9", Duration::from_secs(1))]);
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, body) = call(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "financial_coordinator");
    assert_eq!(body["agents"], 1);
}

#[tokio::test]
async fn test_list_and_get_agents() {
    let app = app(vec![
        entry("budget", "http://127.0.0.1:8081", Duration::from_secs(3)),
        entry("security", "http://127.0.0.1:8083", Duration::from_secs(3)),
    ]);

    let (status, body) = call(
        app.clone(),
        Request::get("/api/agents").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["name"], "budget");
    assert_eq!(body[0]["timeout_ms"], 3000);

    let (status, _) = call(
        app,
        Request::get("/api/agents/investment").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_advise_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(EchoAgent { name: "budget" })
        .mount(&server)
        .await;
    let app = app(vec![entry("budget", &server.uri(), Duration::from_secs(2))]);

    let (status, body) = call(
        app,
        post_advise(json!({"query": "help with my budget", "financial_data": {"balance": 1}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_status"], "success");
    assert_eq!(body["synthesis"], "model");
    assert_eq!(body["per_agent_findings"]["budget"]["state"], "available");
    assert!(body["correlation_id"].as_str().is_some());
}

#[tokio::test]
async fn test_advise_rejects_empty_query() {
    let app = app(vec![entry("budget", "http://127.0.0.1:9", Duration::from_secs(1))]);
    let (status, body) = call(app, post_advise(json!({"query": "   "}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("query"));
}

#[tokio::test]
async fn test_advise_without_agents_is_503() {
    let app = app(Vec::new());
    let (status, body) = call(app, post_advise(json!({"query": "hello"}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("No agents"));
}
