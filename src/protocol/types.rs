//! Message types and payloads for the A2A protocol.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Behaviour selector on the receiving agent.
///
/// The known tags are the ones the built-in specialists handle; anything else
/// round-trips through `Custom` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Generic request used by the default plan.
    Analyze,
    AnalyzeSpending,
    CreateSavingsPlan,
    AssessRiskProfile,
    DesignPortfolio,
    RetirementPlanning,
    DetectFraud,
    AssessFinancialHealth,
    AnalyzeIdentityProtection,
    ComprehensiveSecurityAnalysis,
    Custom(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Analyze => "analyze",
            MessageType::AnalyzeSpending => "analyze_spending",
            MessageType::CreateSavingsPlan => "create_savings_plan",
            MessageType::AssessRiskProfile => "assess_risk_profile",
            MessageType::DesignPortfolio => "design_portfolio",
            MessageType::RetirementPlanning => "retirement_planning",
            MessageType::DetectFraud => "detect_fraud",
            MessageType::AssessFinancialHealth => "assess_financial_health",
            MessageType::AnalyzeIdentityProtection => "analyze_identity_protection",
            MessageType::ComprehensiveSecurityAnalysis => "comprehensive_security_analysis",
            MessageType::Custom(tag) => tag,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, MessageType::Custom(_))
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        match tag {
            "analyze" => MessageType::Analyze,
            "analyze_spending" => MessageType::AnalyzeSpending,
            "create_savings_plan" => MessageType::CreateSavingsPlan,
            "assess_risk_profile" => MessageType::AssessRiskProfile,
            "design_portfolio" => MessageType::DesignPortfolio,
            "retirement_planning" => MessageType::RetirementPlanning,
            "detect_fraud" => MessageType::DetectFraud,
            "assess_financial_health" => MessageType::AssessFinancialHealth,
            "analyze_identity_protection" => MessageType::AnalyzeIdentityProtection,
            "comprehensive_security_analysis" => MessageType::ComprehensiveSecurityAnalysis,
            other => MessageType::Custom(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        MessageType::from(tag.as_str())
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Custom(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body carried inside an envelope.
///
/// The fields every specialist reads are typed; agent-specific extras ride in
/// `extra`, flattened into the same JSON object on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// The user's original query.
    #[serde(default)]
    pub query_context: String,
    /// Banking data supplied by the caller, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial_data: Option<Value>,
    #[serde(default)]
    pub coordinator_request: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Payload {
    pub fn for_query(query: impl Into<String>) -> Self {
        Self {
            query_context: query.into(),
            financial_data: None,
            coordinator_request: true,
            extra: Map::new(),
        }
    }

    pub fn with_financial_data(mut self, data: Value) -> Self {
        self.financial_data = Some(data);
        self
    }
}

/// Status field of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Body of `GET /a2a/capabilities`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub agent_id: String,
    #[serde(default)]
    pub agent_type: String,
    pub protocol_version: String,
    pub supported_message_types: Vec<MessageType>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub health_endpoint: String,
}

impl AgentCapabilities {
    pub fn supports(&self, message_type: &MessageType) -> bool {
        self.supported_message_types.contains(message_type)
    }
}

/// Body of `GET /health` on a specialist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub agent: String,
    #[serde(default)]
    pub protocol_version: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
