//! Configuration loading for finadvisor.
//!
//! Settings are read once at startup and handed to the components that need
//! them; nothing reads configuration from ambient globals after that.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "FINADVISOR_SETTINGS";

/// Get the finadvisor home directory (~/.finadvisor).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".finadvisor"))
}

/// Get the settings file path, honoring `FINADVISOR_SETTINGS`.
pub fn get_settings_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(SETTINGS_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load and validate settings from an explicit path.
pub fn load_settings_from(path: &std::path::Path) -> Result<Settings> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Settings file not found at {}. Run 'finadvisor init' first.",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write settings as pretty JSON, creating parent directories.
pub fn save_settings(settings: &Settings, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    for (name, agent) in &settings.agents {
        if name.trim().is_empty() {
            return Err(Error::Config("agent names must not be empty".to_string()));
        }
        if name == &settings.coordinator.agent_id {
            return Err(Error::Config(format!(
                "agent '{}' has the same id as the coordinator",
                name
            )));
        }
        reqwest::Url::parse(&agent.url).map_err(|e| {
            Error::Config(format!("agents.{}.url '{}' is invalid: {}", name, agent.url, e))
        })?;
        if agent.timeout_secs == Some(0) {
            return Err(Error::Config(format!(
                "agents.{}.timeout_secs must be positive",
                name
            )));
        }
    }

    if settings.coordinator.request_timeout_secs == 0 {
        return Err(Error::Config(
            "coordinator.request_timeout_secs must be positive".to_string(),
        ));
    }
    if settings.coordinator.agent_id.trim().is_empty() {
        return Err(Error::Config("coordinator.agent_id must not be empty".to_string()));
    }
    Ok(())
}

/// A specialist agent reachable over A2A.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AgentConfig {
    /// Base URL; the protocol endpoints are resolved relative to it.
    pub url: String,
    /// Per-call timeout override.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AgentConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_secs: None,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Coordinator behaviour.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CoordinatorSettings {
    /// Sender name stamped on outgoing envelopes.
    #[serde(default = "default_coordinator_id")]
    pub agent_id: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_coordinator_port")]
    pub port: u16,
    /// Per-call timeout when an agent has no override.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Slack added on top of the slowest target when computing the round deadline.
    #[serde(default = "default_round_margin_ms")]
    pub round_margin_ms: u64,
    /// Retries for timeouts and transport errors. Clamped to one.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Probe `/a2a/capabilities` on startup.
    #[serde(default = "default_true")]
    pub discover_capabilities: bool,
}

fn default_coordinator_id() -> String {
    "financial_coordinator".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_coordinator_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_round_margin_ms() -> u64 {
    500
}

fn default_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            agent_id: default_coordinator_id(),
            host: default_host(),
            port: default_coordinator_port(),
            request_timeout_secs: default_request_timeout_secs(),
            round_margin_ms: default_round_margin_ms(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            discover_capabilities: true,
        }
    }
}

impl CoordinatorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Provider model configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderModel {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Models configuration. An empty `provider` disables model calls entirely.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Models {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub openai: ProviderModel,
    #[serde(default)]
    pub ollama: ProviderModel,
    /// Fixed reply served by the `scripted` provider, for offline runs.
    #[serde(default)]
    pub scripted_reply: Option<String>,
    /// Bound on any single classification or synthesis call.
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model_timeout_secs() -> u64 {
    20
}

impl Default for Models {
    fn default() -> Self {
        Self {
            provider: String::new(),
            openai: ProviderModel::default(),
            ollama: ProviderModel::default(),
            scripted_reply: None,
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

impl Models {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// finadvisor settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, AgentConfig>,

    #[serde(default)]
    pub models: Models,
}

fn default_agents() -> BTreeMap<String, AgentConfig> {
    let mut agents = BTreeMap::new();
    agents.insert("budget".to_string(), AgentConfig::new("http://localhost:8081"));
    agents.insert("investment".to_string(), AgentConfig::new("http://localhost:8082"));
    agents.insert("security".to_string(), AgentConfig::new("http://localhost:8083"));
    agents
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorSettings::default(),
            agents: default_agents(),
            models: Models::default(),
        }
    }
}

impl Settings {
    /// Per-call timeout for an agent, falling back to the coordinator default.
    pub fn timeout_for(&self, agent: &str) -> Duration {
        self.agents
            .get(agent)
            .and_then(|a| a.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.coordinator.request_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(validate_settings(&settings).is_ok());
        assert_eq!(settings.agents.len(), 3);
        assert_eq!(settings.coordinator.retries, 1);
        assert!(settings.models.provider.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"coordinator": {"port": 9000}, "agents": {"budget": {"url": "http://budget:8080", "timeout_secs": 5}}}"#,
        )
        .unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.coordinator.port, 9000);
        assert_eq!(settings.coordinator.agent_id, "financial_coordinator");
        assert_eq!(settings.agents.len(), 1);
        assert_eq!(settings.timeout_for("budget"), Duration::from_secs(5));
        assert_eq!(settings.timeout_for("missing"), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut settings = Settings::default();
        settings.agents.insert("broken".to_string(), AgentConfig::new("not a url"));
        let err = validate_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_agent_named_like_coordinator_rejected() {
        let mut settings = Settings::default();
        settings.agents.insert(
            "financial_coordinator".to_string(),
            AgentConfig::new("http://localhost:9999"),
        );
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.models.provider = "ollama".to_string();

        save_settings(&settings, &path).unwrap();
        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded.models.provider, "ollama");
        assert_eq!(loaded.agents.len(), 3);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
