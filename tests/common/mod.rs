//! Shared helpers for integration tests.
#![allow(dead_code)]

use finadvisor::agent::{router, AgentProfile, AgentService, PromptAgent};
use finadvisor::coordinator::{Advisor, Coordinator};
use finadvisor::dispatch::Dispatcher;
use finadvisor::planner::Planner;
use finadvisor::protocol::{A2aResponse, Envelope, PROTOCOL_HEADER, PROTOCOL_VERSION};
use finadvisor::providers::{Provider, ScriptedProvider};
use finadvisor::registry::{AgentEntry, AgentRegistry};
use finadvisor::synthesis::Synthesizer;
use reqwest::{Client, Url};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

/// Answers every A2A request with a success envelope echoing its ids.
pub struct EchoAgent {
    pub name: &'static str,
}

impl Respond for EchoAgent {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let envelope: Envelope = match serde_json::from_slice(&request.body) {
            Ok(envelope) => envelope,
            Err(_) => return ResponseTemplate::new(400),
        };
        let reply = A2aResponse::success(
            &envelope,
            format!("{}_agent", self.name),
            json!({
                "agent": self.name,
                "recommendation": format!("{} recommendation", self.name),
            }),
        );
        ResponseTemplate::new(200)
            .insert_header(PROTOCOL_HEADER, PROTOCOL_VERSION)
            .set_body_json(reply)
    }
}

/// Answers every A2A request with a protocol-level error envelope.
pub struct FailingAgent;

impl Respond for FailingAgent {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let envelope: Envelope = match serde_json::from_slice(&request.body) {
            Ok(envelope) => envelope,
            Err(_) => return ResponseTemplate::new(400),
        };
        ResponseTemplate::new(200)
            .insert_header(PROTOCOL_HEADER, PROTOCOL_VERSION)
            .set_body_json(A2aResponse::error(&envelope, "agent", "model unavailable"))
    }
}

pub fn entry(name: &str, base_url: &str, timeout: Duration) -> AgentEntry {
    AgentEntry::new(name, Url::parse(base_url).unwrap(), timeout)
}

/// A base URL nothing is listening on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

pub fn model_provider() -> Arc<dyn Provider> {
    Arc::new(ScriptedProvider::replying(
        r#"{"summary": "Combined advice.", "detailed_plan": ["Step one"], "next_actions": ["Act"]}"#,
    ))
}

/// Advisor with keyword planning, the given synthesis provider, and a
/// coordinator with no retries unless stated.
pub fn advisor(
    entries: Vec<AgentEntry>,
    synthesis: Option<Arc<dyn Provider>>,
    retries: u32,
) -> Advisor {
    let client = Client::new();
    let registry = Arc::new(AgentRegistry::new(entries));
    let coordinator = Coordinator::new(
        Arc::clone(&registry),
        Dispatcher::new(client.clone()),
        "financial_coordinator",
    )
    .with_retries(retries)
    .with_backoff(Duration::from_millis(20))
    .with_round_margin(Duration::from_millis(200));

    Advisor::new(
        registry,
        Planner::new(None, Duration::from_secs(1)),
        coordinator,
        Synthesizer::new(synthesis, Duration::from_secs(1)),
        client,
    )
}

/// Start a real specialist server on an ephemeral port and return its base URL.
pub async fn start_agent(name: &str, provider: Option<Arc<dyn Provider>>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let profile = AgentProfile::by_name(name).unwrap();
    let handler = PromptAgent::new(profile, provider, Duration::from_secs(1));
    let service = Arc::new(AgentService::new(Arc::new(handler), base.clone()));

    tokio::spawn(async move {
        axum::serve(listener, router(service)).await.unwrap();
    });

    base
}
