//! API endpoints for registered agents.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::protocol::AgentCapabilities;
use crate::registry::AgentEntry;
use crate::web::AppState;

/// Agent API response.
#[derive(Serialize)]
pub struct AgentResponse {
    pub name: String,
    pub endpoint: String,
    pub timeout_ms: u64,
    pub capabilities: Option<AgentCapabilities>,
}

impl From<AgentEntry> for AgentResponse {
    fn from(entry: AgentEntry) -> Self {
        Self {
            name: entry.name,
            endpoint: entry.endpoint.to_string(),
            timeout_ms: entry.timeout.as_millis() as u64,
            capabilities: entry.capabilities,
        }
    }
}

/// List all registered agents.
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentResponse>> {
    let agents = state
        .advisor
        .registry()
        .snapshot()
        .values()
        .cloned()
        .map(AgentResponse::from)
        .collect();

    Json(agents)
}

/// Get a single agent.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AgentResponse>, StatusCode> {
    let entry = state
        .advisor
        .registry()
        .resolve(&name)
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(AgentResponse::from(entry)))
}
