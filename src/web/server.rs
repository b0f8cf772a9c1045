//! Web server using Axum.

use std::net::SocketAddr;
use std::sync::Arc;

use super::router::create_app_router;
use super::AppState;
use crate::agent::server::shutdown_signal;
use crate::config::CoordinatorSettings;
use crate::error::{Error, Result};

/// Web server configuration.
pub struct WebServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl From<&CoordinatorSettings> for WebServerConfig {
    fn from(settings: &CoordinatorSettings) -> Self {
        Self {
            port: settings.port,
            host: settings.host.clone(),
        }
    }
}

/// Run the coordinator web server until ctrl-c.
pub async fn run_server(config: WebServerConfig, state: Arc<AppState>) -> Result<()> {
    let app = create_app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

    tracing::info!("Starting coordinator web server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Coordinator web server stopped");
    Ok(())
}
