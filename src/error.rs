//! Error types for finadvisor.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("No agents available to dispatch to")]
    NoAgentsAvailable,

    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    #[error("Web error: {0}")]
    Web(String),
}
