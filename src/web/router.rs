//! Route definitions for the coordinator web server.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::{api, AppState};

/// Largest accepted request body. Banking snapshots can be sizeable.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Create the API router.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/advise", post(api::advise))
        .route("/agents", get(api::list_agents))
        .route("/agents/:name", get(api::get_agent))
}

/// Create the full app router.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .route("/health", get(health_check))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub agents: usize,
    pub uptime_seconds: u64,
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.advisor.agent_id().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        agents: state.advisor.registry().len(),
        uptime_seconds: state.uptime_seconds(),
    })
}
