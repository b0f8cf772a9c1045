//! Coordinator web server module (Axum + API).

use std::sync::Arc;
use std::time::Instant;

use crate::coordinator::Advisor;

pub mod api;
pub mod router;
pub mod server;

pub use router::create_app_router;
pub use server::{run_server, WebServerConfig};

/// Shared application state for the web server.
pub struct AppState {
    pub advisor: Arc<Advisor>,
    /// Server start time (for health checks).
    pub start_time: Instant,
}

impl AppState {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self {
            advisor,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
