//! Query planning: which agents to ask, and with which message type.
//!
//! Classification runs as a chain. A model classifier (when a provider is
//! configured) goes first, then a deterministic keyword classifier; if both
//! come up empty the planner falls back to the default plan of every
//! available agent with `analyze`. Planning never fails.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{CorrelationId, MessageType};
use crate::providers::{
    complete_with_timeout, extract_json, truncate_chars, Provider, MAX_QUERY_CHARS,
};

/// One planned dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanTarget {
    pub agent: String,
    pub message_type: MessageType,
}

impl PlanTarget {
    pub fn new(agent: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            agent: agent.into(),
            message_type,
        }
    }
}

/// Which stage of the chain produced the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Model,
    Keywords,
    Default,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoordinationPlan {
    pub correlation_id: CorrelationId,
    pub targets: Vec<PlanTarget>,
    pub source: PlanSource,
}

impl CoordinationPlan {
    /// Every available agent with the generic message type, in name order.
    pub fn default_for(available: &BTreeSet<String>, correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            targets: available
                .iter()
                .map(|agent| PlanTarget::new(agent.clone(), MessageType::Analyze))
                .collect(),
            source: PlanSource::Default,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn agents(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.agent.as_str()).collect()
    }
}

/// Picks targets for a query. `None` means "no opinion"; the planner moves on
/// to the next stage.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Recorded on plans this classifier produces.
    fn source(&self) -> PlanSource {
        PlanSource::Keywords
    }

    async fn classify(&self, query: &str, available: &BTreeSet<String>) -> Option<Vec<PlanTarget>>;
}

struct KeywordRule {
    pattern: Regex,
    agent: &'static str,
    message_type: MessageType,
}

/// Deterministic classifier over word-boundary keyword patterns.
///
/// Rules are checked in order and the first match per agent wins. Broad goals
/// with no specific keyword (saving for a house, general advice) match
/// nothing, which sends them to the default plan.
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        let specs: [(&str, &'static str, MessageType); 9] = [
            (r"\b(fraud\w*|scam\w*|suspicious|unauthori[sz]ed)\b", "security", MessageType::DetectFraud),
            (r"\b(identity|phishing|passwords?)\b", "security", MessageType::AnalyzeIdentityProtection),
            (r"\b(debts?|credit score|financial health)\b", "security", MessageType::AssessFinancialHealth),
            (r"\b(retire\w*|401k|ira|pension)\b", "investment", MessageType::RetirementPlanning),
            (r"\b(risk\w*)\b", "investment", MessageType::AssessRiskProfile),
            (r"\b(invest\w*|portfolio|stocks?|bonds?|etfs?|index funds?)\b", "investment", MessageType::DesignPortfolio),
            (r"\b(savings|emergency fund)\b", "budget", MessageType::CreateSavingsPlan),
            (r"\b(spend\w*|overspend\w*|expenses?|budget\w*|bills?)\b", "budget", MessageType::AnalyzeSpending),
            (r"\b(debts?|loans?)\b", "budget", MessageType::AnalyzeSpending),
        ];

        let rules = specs
            .into_iter()
            .filter_map(|(pattern, agent, message_type)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|pattern| KeywordRule {
                        pattern,
                        agent,
                        message_type,
                    })
            })
            .collect();

        Self { rules }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keywords"
    }

    async fn classify(&self, query: &str, available: &BTreeSet<String>) -> Option<Vec<PlanTarget>> {
        let mut seen = HashSet::new();
        let targets: Vec<PlanTarget> = self
            .rules
            .iter()
            .filter(|rule| available.contains(rule.agent) && rule.pattern.is_match(query))
            .filter(|rule| seen.insert(rule.agent))
            .map(|rule| PlanTarget::new(rule.agent, rule.message_type.clone()))
            .collect();

        (!targets.is_empty()).then_some(targets)
    }
}

/// Shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct ModelPlan {
    #[serde(default)]
    agents_needed: Vec<String>,
    #[serde(default)]
    message_types: BTreeMap<String, String>,
}

/// Classifier backed by the configured model.
pub struct ModelClassifier {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl ModelClassifier {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    fn prompt(query: &str, available: &BTreeSet<String>) -> String {
        let agents: Vec<&str> = available.iter().map(String::as_str).collect();
        format!(
            "Decide which financial specialist agents should handle this query.\n\
             Query: \"{}\"\n\
             Available agents: {}\n\
             Reply with JSON only, shaped like \
             {{\"agents_needed\": [\"budget\"], \"message_types\": {{\"budget\": \"analyze_spending\"}}}}.",
            truncate_chars(query, MAX_QUERY_CHARS),
            agents.join(", ")
        )
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    fn name(&self) -> &str {
        "model"
    }

    fn source(&self) -> PlanSource {
        PlanSource::Model
    }

    async fn classify(&self, query: &str, available: &BTreeSet<String>) -> Option<Vec<PlanTarget>> {
        let prompt = Self::prompt(query, available);
        let text = match complete_with_timeout(self.provider.as_ref(), &prompt, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), "Model classification failed: {}", e);
                return None;
            }
        };

        let plan: ModelPlan = match extract_json(&text).map(serde_json::from_value::<ModelPlan>) {
            Some(Ok(plan)) => plan,
            _ => {
                tracing::warn!("Model classification returned unusable output");
                return None;
            }
        };

        let targets: Vec<PlanTarget> = plan
            .agents_needed
            .into_iter()
            .map(|agent| {
                let message_type = plan
                    .message_types
                    .get(&agent)
                    .map(|t| MessageType::from(t.as_str()))
                    .unwrap_or(MessageType::Analyze);
                PlanTarget::new(agent, message_type)
            })
            .collect();

        (!targets.is_empty()).then_some(targets)
    }
}

pub struct Planner {
    classifiers: Vec<Arc<dyn Classifier>>,
}

impl Planner {
    /// Model classifier (if a provider is given) followed by keywords.
    pub fn new(provider: Option<Arc<dyn Provider>>, timeout: Duration) -> Self {
        let mut classifiers: Vec<Arc<dyn Classifier>> = Vec::new();
        if let Some(provider) = provider {
            classifiers.push(Arc::new(ModelClassifier::new(provider, timeout)));
        }
        classifiers.push(Arc::new(KeywordClassifier::new()));
        Self { classifiers }
    }

    /// An explicit chain. An empty chain always yields the default plan.
    pub fn with_classifiers(classifiers: Vec<Arc<dyn Classifier>>) -> Self {
        Self { classifiers }
    }

    /// Plan a round for `query`. Never fails; an empty `available` set yields
    /// an empty plan.
    pub async fn plan(&self, query: &str, available: &BTreeSet<String>) -> CoordinationPlan {
        let correlation_id = CorrelationId::new();

        if available.is_empty() {
            tracing::warn!("No agents available, planning an empty round");
            return CoordinationPlan {
                correlation_id,
                targets: Vec::new(),
                source: PlanSource::Default,
            };
        }

        for classifier in &self.classifiers {
            let Some(proposed) = classifier.classify(query, available).await else {
                continue;
            };
            let targets = retain_available(proposed, available);
            if targets.is_empty() {
                continue;
            }

            let source = classifier.source();
            tracing::info!(
                correlation_id = %correlation_id,
                classifier = classifier.name(),
                "Planned {} target(s)",
                targets.len()
            );
            return CoordinationPlan {
                correlation_id,
                targets,
                source,
            };
        }

        tracing::info!(
            correlation_id = %correlation_id,
            "Classification inconclusive, using default plan"
        );
        CoordinationPlan::default_for(available, correlation_id)
    }
}

/// Drop targets naming unknown agents and repeated agents.
fn retain_available(targets: Vec<PlanTarget>, available: &BTreeSet<String>) -> Vec<PlanTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| {
            if !available.contains(&t.agent) {
                tracing::warn!(agent = %t.agent, "Dropping plan target for unknown agent");
                return false;
            }
            seen.insert(t.agent.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;

    fn all_agents() -> BTreeSet<String> {
        ["budget", "investment", "security"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn keyword_planner() -> Planner {
        Planner::new(None, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_house_query_falls_back_to_default_plan() {
        crate::logging::init_test();
        let plan = keyword_planner()
            .plan("I want to save for a house down payment", &all_agents())
            .await;

        assert_eq!(plan.source, PlanSource::Default);
        assert_eq!(plan.agents(), vec!["budget", "investment", "security"]);
        assert!(plan.targets.iter().all(|t| t.message_type == MessageType::Analyze));
    }

    #[tokio::test]
    async fn test_keywords_pick_minimal_subset() {
        let plan = keyword_planner()
            .plan("I think there is a suspicious charge on my card", &all_agents())
            .await;
        assert_eq!(plan.source, PlanSource::Keywords);
        assert_eq!(plan.targets, vec![PlanTarget::new("security", MessageType::DetectFraud)]);

        let plan = keyword_planner()
            .plan("When can I retire if I cut my spending?", &all_agents())
            .await;
        assert_eq!(
            plan.targets,
            vec![
                PlanTarget::new("investment", MessageType::RetirementPlanning),
                PlanTarget::new("budget", MessageType::AnalyzeSpending),
            ]
        );
    }

    #[tokio::test]
    async fn test_bare_savings_and_risk_keywords() {
        let plan = keyword_planner()
            .plan("How much savings should I keep?", &all_agents())
            .await;
        assert_eq!(plan.source, PlanSource::Keywords);
        assert_eq!(plan.targets, vec![PlanTarget::new("budget", MessageType::CreateSavingsPlan)]);

        let plan = keyword_planner().plan("What is my risk?", &all_agents()).await;
        assert_eq!(plan.source, PlanSource::Keywords);
        assert_eq!(
            plan.targets,
            vec![PlanTarget::new("investment", MessageType::AssessRiskProfile)]
        );
    }

    #[tokio::test]
    async fn test_keywords_respect_availability() {
        let available: BTreeSet<String> = ["budget".to_string()].into_iter().collect();
        let plan = keyword_planner().plan("should I buy stocks?", &available).await;
        // The only matching agent is missing, so the default plan is used.
        assert_eq!(plan.source, PlanSource::Default);
        assert_eq!(plan.agents(), vec!["budget"]);
    }

    #[tokio::test]
    async fn test_empty_registry_gives_empty_plan() {
        let plan = keyword_planner().plan("anything", &BTreeSet::new()).await;
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_odd_queries_never_fail() {
        let planner = keyword_planner();
        let huge = "budget ".repeat(2000);
        for query in ["", "   ", "¿Cuánto debería ahorrar? 💸", "\u{0}\u{1}", huge.as_str()] {
            let plan = planner.plan(query, &all_agents()).await;
            assert!(!plan.is_empty(), "query {:?} produced an empty plan", query);
        }
    }

    #[tokio::test]
    async fn test_model_plan_is_used_and_filtered() {
        let provider = Arc::new(ScriptedProvider::replying(
            r#"```json
{"agents_needed": ["investment", "crypto_oracle", "investment"],
 "message_types": {"investment": "design_portfolio"}}
```"#,
        ));
        let planner = Planner::new(Some(provider), Duration::from_secs(1));

        let plan = planner.plan("help me", &all_agents()).await;
        assert_eq!(plan.source, PlanSource::Model);
        assert_eq!(plan.targets, vec![PlanTarget::new("investment", MessageType::DesignPortfolio)]);
    }

    #[tokio::test]
    async fn test_model_failure_falls_through_to_keywords() {
        let provider = Arc::new(ScriptedProvider::failing("quota exceeded"));
        let planner = Planner::new(Some(provider.clone()), Duration::from_secs(1));

        let plan = planner.plan("review my budget", &all_agents()).await;
        assert_eq!(provider.calls(), 1);
        assert_eq!(plan.source, PlanSource::Keywords);
        assert_eq!(plan.agents(), vec!["budget"]);
    }

    #[tokio::test]
    async fn test_model_garbage_and_timeout_fall_through() {
        let garbage = Arc::new(ScriptedProvider::replying("Sure! I'd ask everyone."));
        let plan = Planner::new(Some(garbage), Duration::from_secs(1))
            .plan("general advice please", &all_agents())
            .await;
        assert_eq!(plan.source, PlanSource::Default);

        let slow = Arc::new(
            ScriptedProvider::replying(r#"{"agents_needed": ["budget"]}"#)
                .with_delay(Duration::from_millis(300)),
        );
        let plan = Planner::new(Some(slow), Duration::from_millis(20))
            .plan("general advice please", &all_agents())
            .await;
        assert_eq!(plan.source, PlanSource::Default);
        assert_eq!(plan.targets.len(), 3);
    }

    #[tokio::test]
    async fn test_model_type_defaults_to_analyze() {
        let provider = Arc::new(ScriptedProvider::replying(r#"{"agents_needed": ["security"]}"#));
        let plan = Planner::new(Some(provider), Duration::from_secs(1))
            .plan("x", &all_agents())
            .await;
        assert_eq!(plan.targets, vec![PlanTarget::new("security", MessageType::Analyze)]);
    }
}
