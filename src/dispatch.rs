//! Single-envelope delivery over HTTP.
//!
//! The dispatcher sends one envelope to one agent and turns whatever happens
//! into a [`DispatchOutcome`]. It never retries and never returns an error:
//! every failure mode is a status on the outcome.

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};

use crate::protocol::{
    A2aResponse, CorrelationId, Envelope, MessageType, ResponseStatus, CORRELATION_HEADER,
    PROCESS_PATH, PROTOCOL_HEADER, PROTOCOL_VERSION,
};
use crate::providers::truncate_chars;

/// Raw bodies quoted in diagnostics are cut to this many characters.
const MAX_BODY_IN_DETAIL: usize = 512;

/// How a single send attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    /// Network failure or a non-200 status.
    TransportError,
    /// The per-dispatch deadline passed.
    Timeout,
    /// The receiver speaks a different protocol version.
    ProtocolMismatch,
    /// HTTP 200 whose body is not a valid response envelope.
    MalformedResponse,
    /// A valid response envelope with `status: "error"`.
    AgentError,
}

impl DispatchStatus {
    pub fn is_success(self) -> bool {
        self == DispatchStatus::Success
    }

    /// Conditions that can clear up on their own. The rest are deterministic
    /// incompatibilities.
    pub fn is_retryable(self) -> bool {
        matches!(self, DispatchStatus::TransportError | DispatchStatus::Timeout)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchStatus::Success => "success",
            DispatchStatus::TransportError => "transport_error",
            DispatchStatus::Timeout => "timeout",
            DispatchStatus::ProtocolMismatch => "protocol_mismatch",
            DispatchStatus::MalformedResponse => "malformed_response",
            DispatchStatus::AgentError => "agent_error",
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of sending one envelope. Exactly one of `response_payload` and
/// `error_detail` is set, depending on `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    agent: String,
    message_id: String,
    correlation_id: CorrelationId,
    message_type: MessageType,
    status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_detail: Option<String>,
    attempts: u32,
    elapsed_ms: u64,
}

impl DispatchOutcome {
    pub fn success(envelope: &Envelope, payload: Value, elapsed: Duration) -> Self {
        Self {
            agent: envelope.receiver().to_string(),
            message_id: envelope.message_id().to_string(),
            correlation_id: envelope.correlation_id().clone(),
            message_type: envelope.message_type().clone(),
            status: DispatchStatus::Success,
            response_payload: Some(payload),
            error_detail: None,
            attempts: 1,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// A failed outcome. Passing `Success` here is a bug; it is recorded as a
    /// transport error instead.
    pub fn failure(
        envelope: &Envelope,
        status: DispatchStatus,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        debug_assert!(!status.is_success(), "failure outcome with success status");
        let status = if status.is_success() {
            DispatchStatus::TransportError
        } else {
            status
        };
        Self {
            agent: envelope.receiver().to_string(),
            message_id: envelope.message_id().to_string(),
            correlation_id: envelope.correlation_id().clone(),
            message_type: envelope.message_type().clone(),
            status,
            response_payload: None,
            error_detail: Some(detail.into()),
            attempts: 1,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Outcome for a target that never reached the network.
    pub fn unresolved(
        agent: impl Into<String>,
        correlation_id: CorrelationId,
        message_type: MessageType,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            message_id: uuid::Uuid::new_v4().to_string(),
            correlation_id,
            message_type,
            status: DispatchStatus::TransportError,
            response_payload: None,
            error_detail: Some(detail.into()),
            attempts: 0,
            elapsed_ms: 0,
        }
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Wall time across every attempt, backoff sleeps included.
    pub(crate) fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn status(&self) -> DispatchStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn response_payload(&self) -> Option<&Value> {
        self.response_payload.as_ref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

/// What came back from the wire before classification.
enum Exchange {
    /// The receiver declared a different protocol version.
    Mismatch { declared: String },
    Reply { status: StatusCode, body: String },
}

/// Sends envelopes over HTTP.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POST `envelope` to the agent at `endpoint` and classify the result.
    ///
    /// Everything from connecting to reading the body counts against
    /// `timeout`. When it expires the request future is dropped, which
    /// aborts the connection.
    pub async fn dispatch(&self, envelope: &Envelope, endpoint: &Url, timeout: Duration) -> DispatchOutcome {
        let started = Instant::now();
        let url = format!("{}{}", endpoint.as_str().trim_end_matches('/'), PROCESS_PATH);

        tracing::debug!(
            agent = envelope.receiver(),
            message_type = %envelope.message_type(),
            correlation_id = %envelope.correlation_id(),
            "Sending A2A message to {}",
            url
        );

        let exchange = match tokio::time::timeout(timeout, self.exchange(envelope, &url)).await {
            Err(_) => {
                tracing::warn!(
                    agent = envelope.receiver(),
                    correlation_id = %envelope.correlation_id(),
                    "A2A call timed out after {:?}",
                    timeout
                );
                return DispatchOutcome::failure(
                    envelope,
                    DispatchStatus::Timeout,
                    format!("no response within {} ms", timeout.as_millis()),
                    started.elapsed(),
                );
            }
            Ok(Err(e)) if e.is_timeout() => {
                tracing::warn!(agent = envelope.receiver(), "A2A call timed out: {}", e);
                return DispatchOutcome::failure(
                    envelope,
                    DispatchStatus::Timeout,
                    e.to_string(),
                    started.elapsed(),
                );
            }
            Ok(Err(e)) => {
                tracing::warn!(agent = envelope.receiver(), "A2A transport failure: {}", e);
                return DispatchOutcome::failure(
                    envelope,
                    DispatchStatus::TransportError,
                    format!("request failed: {}", e),
                    started.elapsed(),
                );
            }
            Ok(Ok(exchange)) => exchange,
        };

        let outcome = classify(envelope, exchange, started.elapsed());
        if outcome.is_success() {
            tracing::info!(
                agent = envelope.receiver(),
                elapsed_ms = outcome.elapsed_ms(),
                "Received A2A response"
            );
        } else {
            tracing::warn!(
                agent = envelope.receiver(),
                status = %outcome.status(),
                "A2A call failed: {}",
                outcome.error_detail().unwrap_or_default()
            );
        }
        outcome
    }

    async fn exchange(&self, envelope: &Envelope, url: &str) -> reqwest::Result<Exchange> {
        let response = self
            .client
            .post(url)
            .header(PROTOCOL_HEADER, PROTOCOL_VERSION)
            .header(CORRELATION_HEADER, envelope.correlation_id().as_str())
            .json(envelope)
            .send()
            .await?;

        // Checked before the body is read.
        if let Some(declared) = response.headers().get(PROTOCOL_HEADER) {
            let declared = declared.to_str().unwrap_or("<non-ascii>");
            if declared != PROTOCOL_VERSION {
                return Ok(Exchange::Mismatch {
                    declared: declared.to_string(),
                });
            }
        }

        let status = response.status();
        let body = response.text().await?;
        Ok(Exchange::Reply { status, body })
    }
}

fn classify(envelope: &Envelope, exchange: Exchange, elapsed: Duration) -> DispatchOutcome {
    let (status, body) = match exchange {
        Exchange::Mismatch { declared } => {
            return DispatchOutcome::failure(
                envelope,
                DispatchStatus::ProtocolMismatch,
                format!(
                    "agent speaks '{}', expected '{}'",
                    declared, PROTOCOL_VERSION
                ),
                elapsed,
            );
        }
        Exchange::Reply { status, body } => (status, body),
    };

    if status != StatusCode::OK {
        return DispatchOutcome::failure(
            envelope,
            DispatchStatus::TransportError,
            format!("HTTP {}: {}", status.as_u16(), truncate_chars(&body, MAX_BODY_IN_DETAIL)),
            elapsed,
        );
    }

    let response: A2aResponse = match serde_json::from_str(&body) {
        Ok(response) => response,
        Err(e) => {
            return DispatchOutcome::failure(
                envelope,
                DispatchStatus::MalformedResponse,
                format!(
                    "invalid response body: {}; body: {}",
                    e,
                    truncate_chars(&body, MAX_BODY_IN_DETAIL)
                ),
                elapsed,
            );
        }
    };

    if &response.correlation_id != envelope.correlation_id() {
        return DispatchOutcome::failure(
            envelope,
            DispatchStatus::MalformedResponse,
            format!(
                "response correlation id '{}' does not match request '{}'",
                response.correlation_id,
                envelope.correlation_id()
            ),
            elapsed,
        );
    }

    match response.status {
        ResponseStatus::Success => DispatchOutcome::success(envelope, response.payload, elapsed),
        ResponseStatus::Error => {
            let detail = response
                .error_message()
                .unwrap_or("agent reported an error without detail")
                .to_string();
            DispatchOutcome::failure(envelope, DispatchStatus::AgentError, detail, elapsed)
        }
    }
}
