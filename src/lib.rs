//! finadvisor library root.
//!
//! A coordinator plans which specialist agents to ask, sends each one an
//! A2A envelope over HTTP, and merges their replies into one answer.

pub mod agent;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod planner;
pub mod protocol;
pub mod providers;
pub mod registry;
pub mod synthesis;
pub mod web;

pub use cli::Commands;
pub use config::{load_settings_from, Settings};
pub use coordinator::{Advisor, Coordinator};
pub use dispatch::{DispatchOutcome, DispatchStatus, Dispatcher};
pub use error::{Error, Result};
pub use planner::{CoordinationPlan, PlanTarget, Planner};
pub use protocol::{CorrelationId, Envelope, MessageType, Payload};
pub use providers::Provider;
pub use registry::{AgentEntry, AgentRegistry};
pub use synthesis::{OverallStatus, SynthesizedResult, Synthesizer};
pub use web::run_server;
