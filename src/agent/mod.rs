//! Specialist agents: the receiving side of A2A.
//!
//! A specialist is an [`AgentProfile`] (name, supported message types,
//! default type) plus an [`AgentHandler`] that turns one envelope into a
//! response payload. [`server`] exposes a handler over HTTP.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{Envelope, MessageType};

pub mod handler;
pub mod server;

pub use handler::PromptAgent;
pub use server::{router, run_agent_server, AgentService};

/// Static description of a specialist.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    /// Registry name, e.g. `budget`.
    pub name: String,
    /// Agent id stamped on replies, e.g. `budget_agent`.
    pub agent_id: String,
    pub agent_type: String,
    pub supported_message_types: Vec<MessageType>,
    /// Used for `analyze` and any unsupported type.
    pub default_message_type: MessageType,
    pub capabilities: Vec<String>,
    /// One-line description of the specialist's domain, used in prompts.
    pub focus: String,
}

impl AgentProfile {
    pub fn budget() -> Self {
        Self::build(
            "budget",
            "budget_analysis",
            &[MessageType::AnalyzeSpending, MessageType::CreateSavingsPlan],
            &["spending_analysis", "savings_planning", "expense_categorization"],
            "budgeting, spending patterns, and savings plans",
        )
    }

    pub fn investment() -> Self {
        Self::build(
            "investment",
            "investment_analysis",
            &[
                MessageType::AssessRiskProfile,
                MessageType::DesignPortfolio,
                MessageType::RetirementPlanning,
            ],
            &["risk_assessment", "portfolio_design", "retirement_planning"],
            "risk tolerance, portfolio allocation, and retirement planning",
        )
    }

    pub fn security() -> Self {
        Self::build(
            "security",
            "security_analysis",
            &[
                MessageType::DetectFraud,
                MessageType::AssessFinancialHealth,
                MessageType::AnalyzeIdentityProtection,
                MessageType::ComprehensiveSecurityAnalysis,
            ],
            &["fraud_detection", "financial_health", "identity_protection"],
            "fraud detection, financial health, and identity protection",
        )
    }

    /// Built-in profile for a registry name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "budget" => Some(Self::budget()),
            "investment" => Some(Self::investment()),
            "security" => Some(Self::security()),
            _ => None,
        }
    }

    pub fn builtin_names() -> [&'static str; 3] {
        ["budget", "investment", "security"]
    }

    fn build(
        name: &str,
        agent_type: &str,
        supported: &[MessageType],
        capabilities: &[&str],
        focus: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            agent_id: format!("{}_agent", name),
            agent_type: agent_type.to_string(),
            default_message_type: supported[0].clone(),
            supported_message_types: supported.to_vec(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            focus: focus.to_string(),
        }
    }

    pub fn supports(&self, message_type: &MessageType) -> bool {
        self.supported_message_types.contains(message_type)
    }

    /// The type this agent will actually run for a request.
    pub fn effective_type(&self, requested: &MessageType) -> MessageType {
        if self.supports(requested) {
            return requested.clone();
        }
        if *requested != MessageType::Analyze {
            tracing::warn!(
                agent = %self.name,
                requested = %requested,
                fallback = %self.default_message_type,
                "Unsupported message type, using default"
            );
        }
        self.default_message_type.clone()
    }
}

/// Produces the response payload for one envelope.
///
/// An `Err` becomes a protocol-level error reply (HTTP 200,
/// `status: "error"`), not a transport failure.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    fn profile(&self) -> &AgentProfile;

    async fn handle(&self, message_type: &MessageType, envelope: &Envelope) -> Result<Value>;
}
