//! HTTP front for a specialist agent.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::AgentHandler;
use crate::error::{Error, Result};
use crate::protocol::{
    A2aResponse, AgentCapabilities, CorrelationId, Envelope, HealthStatus, CAPABILITIES_PATH,
    CORRELATION_HEADER, HEALTH_PATH, PROCESS_PATH, PROTOCOL_HEADER, PROTOCOL_VERSION,
};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Fields a request body must carry. `sender_id`/`receiver_id` count for
/// `sender`/`receiver`.
const REQUIRED_FIELDS: [(&str, Option<&str>); 5] = [
    ("message_id", None),
    ("sender", Some("sender_id")),
    ("receiver", Some("receiver_id")),
    ("message_type", None),
    ("payload", None),
];

/// One specialist behind HTTP.
pub struct AgentService {
    handler: Arc<dyn AgentHandler>,
    /// Base URL advertised in the capabilities document.
    public_endpoint: String,
}

impl AgentService {
    pub fn new(handler: Arc<dyn AgentHandler>, public_endpoint: impl Into<String>) -> Self {
        Self {
            handler,
            public_endpoint: public_endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn capabilities(&self) -> AgentCapabilities {
        let profile = self.handler.profile();
        AgentCapabilities {
            agent_id: profile.agent_id.clone(),
            agent_type: profile.agent_type.clone(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            supported_message_types: profile.supported_message_types.clone(),
            capabilities: profile.capabilities.clone(),
            endpoint: format!("{}{}", self.public_endpoint, PROCESS_PATH),
            health_endpoint: format!("{}{}", self.public_endpoint, HEALTH_PATH),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            agent: self.handler.profile().agent_id.clone(),
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// Run the handler for a validated envelope. Handler failures become an
    /// error reply.
    pub async fn process(&self, envelope: &Envelope) -> A2aResponse {
        let profile = self.handler.profile();
        let message_type = profile.effective_type(envelope.message_type());

        tracing::info!(
            agent = %profile.name,
            message_type = %message_type,
            correlation_id = %envelope.correlation_id(),
            sender = envelope.sender(),
            "Processing A2A message"
        );

        match self.handler.handle(&message_type, envelope).await {
            Ok(payload) => A2aResponse::success(envelope, profile.agent_id.clone(), payload),
            Err(e) => {
                tracing::error!(
                    agent = %profile.name,
                    correlation_id = %envelope.correlation_id(),
                    "A2A processing failed: {}",
                    e
                );
                A2aResponse::error(envelope, profile.agent_id.clone(), e.to_string())
            }
        }
    }
}

/// Body of a 400 reply.
#[derive(Debug, Serialize)]
struct BadRequest {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing_fields: Vec<&'static str>,
}

impl BadRequest {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            missing_fields: Vec::new(),
        }
    }
}

impl IntoResponse for BadRequest {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            [(PROTOCOL_HEADER, PROTOCOL_VERSION)],
            Json(self),
        )
            .into_response()
    }
}

/// Router exposing the A2A endpoints for `service`.
pub fn router(service: Arc<AgentService>) -> Router {
    Router::new()
        .route(PROCESS_PATH, post(process))
        .route(CAPABILITIES_PATH, get(capabilities))
        .route(HEALTH_PATH, get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(service)
}

async fn process(
    State(service): State<Arc<AgentService>>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, BadRequest> {
    let envelope = parse_request(&headers, &body)?;
    let reply = service.process(&envelope).await;
    Ok((
        [
            (PROTOCOL_HEADER, PROTOCOL_VERSION.to_string()),
            (CORRELATION_HEADER, reply.correlation_id.to_string()),
        ],
        Json(reply),
    )
        .into_response())
}

async fn capabilities(State(service): State<Arc<AgentService>>) -> impl IntoResponse {
    ([(PROTOCOL_HEADER, PROTOCOL_VERSION)], Json(service.capabilities()))
}

async fn health(State(service): State<Arc<AgentService>>) -> impl IntoResponse {
    ([(PROTOCOL_HEADER, PROTOCOL_VERSION)], Json(service.health()))
}

/// Validate headers and body and build the envelope.
fn parse_request(headers: &HeaderMap, body: &[u8]) -> std::result::Result<Envelope, BadRequest> {
    if let Some(declared) = header_str(headers, PROTOCOL_HEADER) {
        if declared != PROTOCOL_VERSION {
            return Err(BadRequest::new(format!(
                "unsupported protocol '{}', expected '{}'",
                declared, PROTOCOL_VERSION
            )));
        }
    }

    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| BadRequest::new(format!("invalid JSON body: {}", e)))?;
    let Some(fields) = value.as_object_mut() else {
        return Err(BadRequest::new("request body must be a JSON object"));
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .filter(|(name, alias)| {
            !fields.contains_key(*name) && !alias.is_some_and(|a| fields.contains_key(a))
        })
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(BadRequest {
            error: "missing required fields".to_string(),
            missing_fields: missing,
        });
    }

    let header_correlation = header_str(headers, CORRELATION_HEADER);
    let body_correlation = fields
        .get("correlation_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    match (body_correlation, header_correlation) {
        (Some(body_id), Some(header_id)) if body_id != header_id => {
            return Err(BadRequest::new(format!(
                "correlation id mismatch: body '{}', header '{}'",
                body_id, header_id
            )));
        }
        (None, _) => {
            let id = header_correlation
                .map(CorrelationId::from)
                .unwrap_or_default();
            fields.insert("correlation_id".to_string(), Value::String(id.to_string()));
        }
        _ => {}
    }

    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| BadRequest::new(format!("invalid envelope: {}", e)))?;

    if envelope.sender() == envelope.receiver() {
        return Err(BadRequest::new("sender and receiver must differ"));
    }
    Ok(envelope)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Serve `service` until ctrl-c.
pub async fn run_agent_server(service: Arc<AgentService>, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

    let name = service.handler.profile().name.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(agent = %name, "Specialist agent listening on {}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(agent = %name, "Specialist agent stopped");
    Ok(())
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn valid() -> Value {
        json!({
            "message_id": "m-1",
            "correlation_id": "c-1",
            "sender": "financial_coordinator",
            "receiver": "budget",
            "message_type": "analyze_spending",
            "payload": {"query_context": "hi"}
        })
    }

    #[test]
    fn test_valid_request_parses() {
        let envelope = parse_request(&HeaderMap::new(), &body(valid())).unwrap();
        assert_eq!(envelope.message_id(), "m-1");
        assert_eq!(envelope.correlation_id().as_str(), "c-1");
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = parse_request(&HeaderMap::new(), &body(json!({"message_id": "m"}))).unwrap_err();
        assert_eq!(
            err.missing_fields,
            vec!["sender", "receiver", "message_type", "payload"]
        );
    }

    #[test]
    fn test_legacy_field_names_accepted() {
        let legacy = json!({
            "message_id": "m-2",
            "sender_id": "financial_coordinator",
            "receiver_id": "security",
            "message_type": "detect_fraud",
            "payload": {}
        });
        let mut headers = HeaderMap::new();
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("from-header"));

        let envelope = parse_request(&headers, &body(legacy)).unwrap();
        assert_eq!(envelope.receiver(), "security");
        assert_eq!(envelope.correlation_id().as_str(), "from-header");
    }

    #[test]
    fn test_header_checks() {
        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_HEADER, HeaderValue::from_static("financial-advisor-v2"));
        assert!(parse_request(&headers, &body(valid())).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_HEADER, HeaderValue::from_static(PROTOCOL_VERSION));
        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("other"));
        let err = parse_request(&headers, &body(valid())).unwrap_err();
        assert!(err.error.contains("correlation id mismatch"));
    }

    #[test]
    fn test_garbage_bodies() {
        assert!(parse_request(&HeaderMap::new(), b"not json").is_err());
        assert!(parse_request(&HeaderMap::new(), b"[1,2]").is_err());

        let mut same = valid();
        same["receiver"] = json!("financial_coordinator");
        assert!(parse_request(&HeaderMap::new(), &body(same)).is_err());
    }
}
