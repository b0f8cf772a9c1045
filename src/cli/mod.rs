//! CLI commands for finadvisor using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentProfile, AgentService, PromptAgent};
use crate::config::{self, Settings, SETTINGS_ENV};
use crate::coordinator::Advisor;
use crate::protocol::{HealthStatus, HEALTH_PATH};
use crate::providers::create_provider;
use crate::registry::AgentEntry;
use crate::synthesis::{Finding, SynthesizedResult};
use crate::web::{AppState, WebServerConfig};

/// finadvisor - multi-agent financial advisor over the A2A protocol.
#[derive(Parser)]
#[command(name = "finadvisor")]
#[command(version)]
#[command(about = "Multi-agent financial advisor coordinating specialists over A2A", long_about = None)]
pub struct Commands {
    /// Settings file (defaults to ~/.finadvisor/settings.json)
    #[arg(long, global = true, env = SETTINGS_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the coordinator web server
    Serve {
        /// Port to listen on (overrides settings)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides settings)
        #[arg(long)]
        host: Option<String>,

        /// Skip the capability probe at startup
        #[arg(long)]
        no_discover: bool,
    },

    /// Run a specialist agent: budget, investment, or security
    Agent {
        /// Agent name
        name: String,

        /// Port to listen on (defaults to the port in the agent's configured URL)
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Base URL advertised in the capabilities document
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Ask the advisor a question
    Ask {
        /// The question
        query: String,

        /// Banking data as inline JSON, or @path to a JSON file
        #[arg(long)]
        financial_data: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe every configured agent
    Agents,

    /// Write a default settings file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => config::get_settings_path()?,
        };

        match &self.command {
            Command::Init { force } => cmd_init(&path, *force),
            Command::Serve {
                port,
                host,
                no_discover,
            } => cmd_serve(load(&path)?, *port, host.clone(), *no_discover).await,
            Command::Agent {
                name,
                port,
                host,
                public_url,
            } => cmd_agent(&load(&path)?, name, *port, host, public_url.clone()).await,
            Command::Ask {
                query,
                financial_data,
                json,
            } => cmd_ask(&load(&path)?, query, financial_data.as_deref(), *json).await,
            Command::Agents => cmd_agents(&load(&path)?).await,
        }
    }
}

/// Settings from `path`, or defaults when no file exists yet.
fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        tracing::info!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }
    config::load_settings_from(path).with_context(|| format!("loading {}", path.display()))
}

// Command implementations

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Settings already exist at {}", path.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    config::save_settings(&Settings::default(), path)?;
    println!("Wrote default settings to {}", path.display());
    println!();
    println!("Next steps:");
    println!("  finadvisor agent budget        # :8081");
    println!("  finadvisor agent investment    # :8082");
    println!("  finadvisor agent security      # :8083");
    println!("  finadvisor serve               # :8080");
    Ok(())
}

async fn cmd_serve(
    mut settings: Settings,
    port: Option<u16>,
    host: Option<String>,
    no_discover: bool,
) -> Result<()> {
    if let Some(port) = port {
        settings.coordinator.port = port;
    }
    if let Some(host) = host {
        settings.coordinator.host = host;
    }

    let advisor = Arc::new(Advisor::from_settings(&settings)?);
    if settings.coordinator.discover_capabilities && !no_discover {
        let found = advisor.discover().await;
        println!(
            "Discovered capabilities for {}/{} agents",
            found,
            advisor.registry().len()
        );
    }

    let config = WebServerConfig::from(&settings.coordinator);
    println!("Starting coordinator on {}:{}...", config.host, config.port);
    println!("API endpoints:");
    println!("  POST http://localhost:{}/api/advise", config.port);
    println!("  GET  http://localhost:{}/api/agents", config.port);
    println!("  GET  http://localhost:{}/health", config.port);
    println!();
    println!("Press Ctrl+C to stop");

    crate::web::run_server(config, Arc::new(AppState::new(advisor)))
        .await
        .context("coordinator web server")?;
    Ok(())
}

async fn cmd_agent(
    settings: &Settings,
    name: &str,
    port: Option<u16>,
    host: &str,
    public_url: Option<String>,
) -> Result<()> {
    let profile = AgentProfile::by_name(name).with_context(|| {
        format!(
            "unknown agent '{}', expected one of: {}",
            name,
            AgentProfile::builtin_names().join(", ")
        )
    })?;

    let configured = settings
        .agents
        .get(name)
        .and_then(|a| reqwest::Url::parse(&a.url).ok());
    let port = port
        .or_else(|| configured.as_ref().and_then(|u| u.port_or_known_default()))
        .unwrap_or(8080);
    let public_url = public_url
        .or_else(|| configured.map(|u| u.to_string()))
        .unwrap_or_else(|| format!("http://localhost:{}", port));

    let client = reqwest::Client::new();
    let provider = create_provider(&settings.models, client);
    if provider.is_none() {
        println!("Warning: no model provider configured; every request will get an error reply.");
    }

    let handler = PromptAgent::new(profile, provider, settings.models.timeout());
    let service = Arc::new(AgentService::new(Arc::new(handler), public_url));

    println!("Starting {} agent on {}:{}...", name, host, port);
    println!("Press Ctrl+C to stop");
    crate::agent::run_agent_server(service, host, port)
        .await
        .with_context(|| format!("{} agent server", name))?;
    Ok(())
}

async fn cmd_ask(settings: &Settings, query: &str, financial_data: Option<&str>, json: bool) -> Result<()> {
    let financial_data = financial_data.map(parse_financial_data).transpose()?;

    let advisor = Advisor::from_settings(settings)?;
    let result = advisor.advise(query, financial_data).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }
    Ok(())
}

/// Inline JSON, or `@path` to a JSON file.
fn parse_financial_data(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("financial data is not valid JSON")
}

fn print_result(result: &SynthesizedResult) {
    println!("{}", result.summary);

    if !result.detailed_plan.is_empty() {
        println!("\nPlan:");
        for (i, step) in result.detailed_plan.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }

    if !result.next_actions.is_empty() {
        println!("\nNext actions:");
        for action in &result.next_actions {
            println!("  - {}", action);
        }
    }

    println!("\nAgents:");
    for (agent, finding) in &result.per_agent_findings {
        match finding {
            Finding::Available { message_type, .. } => {
                println!("  @{} | ok | {}", agent, message_type)
            }
            Finding::Unavailable { status, detail } => {
                println!("  @{} | {} | {}", agent, status, truncate_detail(detail))
            }
        }
    }

    println!(
        "\nStatus: {:?} via {:?} (correlation {})",
        result.overall_status, result.synthesis, result.correlation_id
    );
}

fn truncate_detail(detail: &str) -> String {
    if detail.chars().count() > 90 {
        format!("{}...", detail.chars().take(90).collect::<String>())
    } else {
        detail.to_string()
    }
}

async fn cmd_agents(settings: &Settings) -> Result<()> {
    let advisor = Advisor::from_settings(settings)?;
    if advisor.registry().is_empty() {
        println!("No agents configured.");
        return Ok(());
    }

    advisor.discover().await;

    let client = reqwest::Client::new();
    let snapshot = advisor.registry().snapshot();
    let probes = snapshot.values().map(|entry| probe_health(&client, entry));
    let health = join_all(probes).await;

    println!("Agents:");
    for (entry, health) in snapshot.values().zip(health) {
        let health = match health {
            Ok(h) if h.is_healthy() => "healthy".to_string(),
            Ok(h) => h.status,
            Err(e) => format!("unreachable ({})", e),
        };
        let types = entry
            .capabilities
            .as_ref()
            .map(|c| {
                c.supported_message_types
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  @{} | {} | health={} | types={}",
            entry.name, entry.endpoint, health, types
        );
    }
    Ok(())
}

async fn probe_health(client: &reqwest::Client, entry: &AgentEntry) -> Result<HealthStatus> {
    let status = client
        .get(entry.url_for(HEALTH_PATH))
        .timeout(entry.timeout.min(Duration::from_secs(5)))
        .send()
        .await?
        .error_for_status()?
        .json::<HealthStatus>()
        .await?;
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Commands::command().debug_assert();
    }

    #[test]
    fn test_parse_ask() {
        let cli = Commands::try_parse_from([
            "finadvisor",
            "ask",
            "Can I afford a house?",
            "--financial-data",
            r#"{"balance": 10}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Ask {
                query,
                financial_data,
                json,
            } => {
                assert_eq!(query, "Can I afford a house?");
                assert_eq!(parse_financial_data(&financial_data.unwrap()).unwrap()["balance"], 10);
                assert!(!json);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_financial_data_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"accounts": []}"#).unwrap();

        let value = parse_financial_data(&format!("@{}", path.display())).unwrap();
        assert!(value["accounts"].is_array());
        assert!(parse_financial_data("{not json").is_err());
    }

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        cmd_init(&path, false).unwrap();
        let settings = load(&path).unwrap();
        assert_eq!(settings.agents.len(), 3);

        std::fs::write(&path, "{}").unwrap();
        cmd_init(&path, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
