//! Model providers module.
//!
//! Classification, synthesis, and the specialist agents all reach the model
//! through [`Provider`]. Call sites wrap every call with
//! [`complete_with_timeout`] and parse replies with [`extract_json`], and
//! each has a deterministic fallback for when either step fails.

use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod ollama;
pub mod openai;
pub mod provider;
pub mod scripted;

pub use provider::{Provider, ProviderError, Result};
pub use scripted::ScriptedProvider;

/// User queries are cut to this many characters before going into a prompt.
pub const MAX_QUERY_CHARS: usize = 4000;

use crate::config::Models;

/// Build the provider named in settings. `None` when model calls are disabled.
pub fn create_provider(models: &Models, client: Client) -> Option<Arc<dyn Provider>> {
    match models.provider.trim() {
        "" | "none" => None,
        "ollama" => {
            let mut provider = ollama::OllamaProvider::new(client);
            if let Some(url) = &models.ollama.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(model) = &models.ollama.model {
                provider = provider.with_model(model.clone());
            }
            Some(Arc::new(provider))
        }
        "openai" => {
            let api_key = models
                .openai
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            let mut provider = openai::OpenAiProvider::new(client, api_key);
            if let Some(url) = &models.openai.base_url {
                provider = provider.with_base_url(url.clone());
            }
            if let Some(model) = &models.openai.model {
                provider = provider.with_model(model.clone());
            }
            Some(Arc::new(provider))
        }
        "scripted" => {
            let reply = models.scripted_reply.clone().unwrap_or_else(|| "{}".to_string());
            Some(Arc::new(ScriptedProvider::replying(reply)))
        }
        other => {
            tracing::warn!("Unknown model provider '{}', model calls disabled", other);
            None
        }
    }
}

/// Complete a prompt, giving up after `timeout`.
pub async fn complete_with_timeout(
    provider: &dyn Provider,
    prompt: &str,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, provider.complete(prompt, None)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout),
    }
}

/// Pull a JSON object out of model output.
///
/// Accepts a bare object, a fenced ```json block, or an object embedded in
/// surrounding prose. Returns `None` for anything that is not an object.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value.is_object().then_some(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str::<Value>(inner) {
            return value.is_object().then_some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
