//! Message envelopes with correlation IDs for tracking agent communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use super::types::{MessageType, Payload, ResponseStatus};
use crate::error::{Error, Result};

/// Identifier shared by every envelope spawned from one user request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(generate_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inter-agent request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    message_id: String,
    correlation_id: CorrelationId,
    #[serde(alias = "sender_id")]
    sender: String,
    #[serde(alias = "receiver_id")]
    receiver: String,
    message_type: MessageType,
    payload: Payload,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope. A fresh correlation id is minted when none is given,
    /// which starts a new round.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        message_type: MessageType,
        payload: Payload,
        correlation_id: Option<CorrelationId>,
    ) -> Result<Self> {
        let sender = sender.into();
        let receiver = receiver.into();

        if sender.trim().is_empty() || receiver.trim().is_empty() {
            return Err(Error::InvalidEnvelope(
                "sender and receiver must be non-empty".to_string(),
            ));
        }
        if sender == receiver {
            return Err(Error::InvalidEnvelope(format!(
                "sender and receiver are both '{}'",
                sender
            )));
        }

        Ok(Self {
            message_id: generate_id(),
            correlation_id: correlation_id.unwrap_or_default(),
            sender,
            receiver,
            message_type,
            payload,
            created_at: Utc::now(),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Reply to an envelope, success or protocol-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2aResponse {
    /// Echo of the request's message id.
    pub message_id: String,
    pub correlation_id: CorrelationId,
    #[serde(default, alias = "sender_id")]
    pub sender: String,
    #[serde(default, alias = "receiver_id")]
    pub receiver: String,
    #[serde(default)]
    pub response_to: Option<MessageType>,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub status: ResponseStatus,
    pub payload: Value,
}

impl A2aResponse {
    /// Successful reply to `request` from `sender`.
    pub fn success(request: &Envelope, sender: impl Into<String>, payload: Value) -> Self {
        Self::reply(request, sender, ResponseStatus::Success, payload)
    }

    /// Protocol-level error reply; the message ends up in `payload.error`.
    pub fn error(request: &Envelope, sender: impl Into<String>, error: impl Into<String>) -> Self {
        let sender = sender.into();
        let payload = json!({
            "error": error.into(),
            "agent_id": sender.clone(),
        });
        Self::reply(request, sender, ResponseStatus::Error, payload)
    }

    fn reply(
        request: &Envelope,
        sender: impl Into<String>,
        status: ResponseStatus,
        payload: Value,
    ) -> Self {
        Self {
            message_id: request.message_id.clone(),
            correlation_id: request.correlation_id.clone(),
            sender: sender.into(),
            receiver: request.sender.clone(),
            response_to: Some(request.message_type.clone()),
            timestamp: Some(Utc::now().to_rfc3339()),
            status,
            payload,
        }
    }

    /// The `error` string inside an error payload, if any.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("error").and_then(Value::as_str)
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
