//! Agent-to-agent (A2A) protocol.
//!
//! This module defines the wire contract between the coordinator and the
//! specialist agents:
//! - Request envelopes with correlation IDs
//! - Typed message types and payloads
//! - Success and error response envelopes
//! - Capability and health documents

pub mod envelope;
pub mod types;

pub use envelope::{A2aResponse, CorrelationId, Envelope};
pub use types::{AgentCapabilities, HealthStatus, MessageType, Payload, ResponseStatus};

/// Header naming the protocol and its version.
pub const PROTOCOL_HEADER: &str = "X-A2A-Protocol";

/// Header duplicating the envelope's correlation id.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// The only protocol version this build speaks.
pub const PROTOCOL_VERSION: &str = "financial-advisor-v1";

pub const PROCESS_PATH: &str = "/a2a/process";
pub const CAPABILITIES_PATH: &str = "/a2a/capabilities";
pub const HEALTH_PATH: &str = "/health";
