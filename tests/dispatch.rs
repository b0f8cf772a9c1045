//! Dispatcher behaviour against scripted HTTP agents.

mod common;

use common::{dead_url, EchoAgent};
use finadvisor::dispatch::{DispatchStatus, Dispatcher};
use finadvisor::protocol::{
    A2aResponse, CorrelationId, Envelope, MessageType, Payload, CORRELATION_HEADER,
    PROTOCOL_HEADER, PROTOCOL_VERSION,
};
use reqwest::{Client, Url};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn envelope(correlation: &CorrelationId) -> Envelope {
    Envelope::new(
        "financial_coordinator",
        "budget",
        MessageType::AnalyzeSpending,
        Payload::for_query("how am I spending?"),
        Some(correlation.clone()),
    )
    .unwrap()
}

async fn dispatch(server_url: &str, envelope: &Envelope, timeout: Duration) -> finadvisor::DispatchOutcome {
    Dispatcher::new(Client::new())
        .dispatch(envelope, &Url::parse(server_url).unwrap(), timeout)
        .await
}

#[tokio::test]
async fn test_success_sends_protocol_headers() {
    let server = MockServer::start().await;
    let cid = CorrelationId::new();

    Mock::given(method("POST"))
        .and(path("/a2a/process"))
        .and(header(PROTOCOL_HEADER, PROTOCOL_VERSION))
        .and(header(CORRELATION_HEADER, cid.as_str()))
        .respond_with(EchoAgent { name: "budget" })
        .expect(1)
        .mount(&server)
        .await;

    let env = envelope(&cid);
    let outcome = dispatch(&server.uri(), &env, Duration::from_secs(2)).await;

    assert_eq!(outcome.status(), DispatchStatus::Success);
    assert_eq!(outcome.correlation_id(), &cid);
    assert_eq!(outcome.message_id(), env.message_id());
    assert_eq!(outcome.response_payload().unwrap()["agent"], "budget");
    assert!(outcome.error_detail().is_none());
}

#[tokio::test]
async fn test_server_error_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::TransportError);
    assert!(outcome.error_detail().unwrap().contains("HTTP 500"));
    assert!(outcome.response_payload().is_none());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let url = dead_url().await;
    let outcome = dispatch(&url, &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::TransportError);
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_millis(150)).await;

    assert_eq!(outcome.status(), DispatchStatus::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_protocol_mismatch_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(PROTOCOL_HEADER, "financial-advisor-v2")
                .set_body_json(json!({"anything": true})),
        )
        .mount(&server)
        .await;

    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::ProtocolMismatch);
    assert!(outcome.error_detail().unwrap().contains("financial-advisor-v2"));
}

#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway page</html>"))
        .mount(&server)
        .await;

    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::MalformedResponse);
    assert!(outcome.error_detail().unwrap().contains("gateway page"));
}

#[tokio::test]
async fn test_foreign_correlation_id_is_malformed() {
    let server = MockServer::start().await;
    let other = envelope(&CorrelationId::from("someone-else"));
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(A2aResponse::success(&other, "budget_agent", json!({}))),
        )
        .mount(&server)
        .await;

    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::MalformedResponse);
    assert!(outcome.error_detail().unwrap().contains("someone-else"));
}

#[tokio::test]
async fn test_error_envelope_is_agent_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(common::FailingAgent)
        .mount(&server)
        .await;

    let outcome = dispatch(&server.uri(), &envelope(&CorrelationId::new()), Duration::from_secs(2)).await;
    assert_eq!(outcome.status(), DispatchStatus::AgentError);
    assert_eq!(outcome.error_detail(), Some("model unavailable"));
}
