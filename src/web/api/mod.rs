//! API endpoints module.

pub mod advise;
pub mod agents;

pub use advise::{advise, AdviseRequest, ApiError};
pub use agents::{get_agent, list_agents, AgentResponse};
