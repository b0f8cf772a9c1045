//! Provider that replays a fixed reply.
//!
//! Selected with `provider: "scripted"` in settings to run the whole system
//! without a model backend. Tests also use it to script failures and delays.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::provider::{Provider, ProviderError, Result};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

pub struct ScriptedProvider {
    reply: Reply,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    /// Always answer with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Reply::Text(text.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Reply::Fail(message.into()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        matches!(self.reply, Reply::Text(_))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted".to_string()])
    }

    async fn complete(&self, _prompt: &str, _model: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail(message) => Err(ProviderError::ApiError(message.clone())),
        }
    }

    fn default_model(&self) -> Option<&str> {
        Some("scripted")
    }
}
