//! Model provider trait for finadvisor.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A hosted or local language model.
///
/// Every caller treats a provider as unreliable: calls may fail, time out, or
/// return text that is not the JSON that was asked for.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name.
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured.
    async fn is_available(&self) -> bool;

    /// List available models.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Complete a prompt.
    async fn complete(&self, prompt: &str, model: Option<&str>) -> Result<String>;

    /// Get the default model.
    fn default_model(&self) -> Option<&str>;
}
