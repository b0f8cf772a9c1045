//! Model-backed specialist.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use super::{AgentHandler, AgentProfile};
use crate::error::{Error, Result};
use crate::protocol::{Envelope, MessageType};
use crate::providers::{
    complete_with_timeout, extract_json, truncate_chars, Provider, ProviderError, MAX_QUERY_CHARS,
};

/// Financial data embedded in a prompt is cut to this many characters.
const MAX_DATA_CHARS: usize = 8000;

/// Answers every request by prompting the configured provider.
///
/// Without a provider, or when the provider fails, the request is answered
/// with a protocol-level error so the coordinator can degrade gracefully.
pub struct PromptAgent {
    profile: AgentProfile,
    provider: Option<Arc<dyn Provider>>,
    timeout: Duration,
}

impl PromptAgent {
    pub fn new(profile: AgentProfile, provider: Option<Arc<dyn Provider>>, timeout: Duration) -> Self {
        Self {
            profile,
            provider,
            timeout,
        }
    }

    fn prompt(&self, message_type: &MessageType, envelope: &Envelope) -> String {
        let payload = envelope.payload();
        let data = payload
            .financial_data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none provided".to_string());

        format!(
            "You are the {} specialist of a financial advisory team, focused on {}.\n\
             Task: {}\n\
             User query: \"{}\"\n\
             Financial data: {}\n\
             Reply with a JSON object holding your analysis and a \"recommendations\" array.",
            self.profile.name,
            self.profile.focus,
            message_type.as_str().replace('_', " "),
            truncate_chars(&payload.query_context, MAX_QUERY_CHARS),
            truncate_chars(&data, MAX_DATA_CHARS),
        )
    }
}

#[async_trait]
impl AgentHandler for PromptAgent {
    fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    async fn handle(&self, message_type: &MessageType, envelope: &Envelope) -> Result<Value> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            Error::Provider(ProviderError::NotAvailable(
                "no model provider configured".to_string(),
            ))
        })?;

        let text = complete_with_timeout(
            provider.as_ref(),
            &self.prompt(message_type, envelope),
            self.timeout,
        )
        .await?;

        let mut body = match extract_json(&text) {
            Some(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("analysis".to_string(), Value::String(text.trim().to_string()));
                map
            }
        };
        body.insert("agent_id".to_string(), json!(self.profile.agent_id));
        body.insert("analysis_type".to_string(), json!(message_type.as_str()));
        Ok(Value::Object(body))
    }
}
