//! Merging per-agent outcomes into one answer.
//!
//! The model writes the answer when it can. Otherwise a deterministic
//! template lays out each successful agent's findings under a goal-specific
//! headline. Either way the result records which path produced it, and any
//! fallback marks the result `Degraded`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::{DispatchOutcome, DispatchStatus};
use crate::protocol::{CorrelationId, MessageType};
use crate::providers::{
    complete_with_timeout, extract_json, truncate_chars, Provider, MAX_QUERY_CHARS,
};

/// Cap on the findings JSON embedded in the synthesis prompt.
const MAX_FINDINGS_CHARS: usize = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    PartialSuccess,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisSource {
    Model,
    Template,
}

/// What one agent contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Finding {
    Available {
        message_type: MessageType,
        payload: Value,
    },
    Unavailable {
        status: DispatchStatus,
        detail: String,
    },
}

impl Finding {
    fn from_outcome(outcome: &DispatchOutcome) -> Self {
        match outcome.response_payload() {
            Some(payload) if outcome.is_success() => Finding::Available {
                message_type: outcome.message_type().clone(),
                payload: payload.clone(),
            },
            _ => Finding::Unavailable {
                status: outcome.status(),
                detail: outcome.error_detail().unwrap_or_default().to_string(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Finding::Available { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedResult {
    pub correlation_id: CorrelationId,
    pub summary: String,
    pub per_agent_findings: BTreeMap<String, Finding>,
    pub overall_status: OverallStatus,
    pub detailed_plan: Vec<String>,
    pub next_actions: Vec<String>,
    pub key_insights: Vec<String>,
    pub synthesis: SynthesisSource,
}

impl SynthesizedResult {
    pub fn successful_agents(&self) -> usize {
        self.per_agent_findings.values().filter(|f| f.is_available()).count()
    }
}

/// Fields the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ModelSynthesis {
    summary: String,
    #[serde(default)]
    detailed_plan: Vec<String>,
    #[serde(default)]
    next_actions: Vec<String>,
}

/// Goal inferred from the query, used to pick template wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Goal {
    House,
    Retirement,
    General,
}

impl Goal {
    fn of(query: &str) -> Self {
        let query = query.to_lowercase();
        if query.contains("house") {
            Goal::House
        } else if query.contains("retirement") {
            Goal::Retirement
        } else {
            Goal::General
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Goal::House => {
                "Based on your house-saving goal, the specialist agents recommend a coordinated savings and investment strategy."
            }
            Goal::Retirement => {
                "For retirement planning, the specialist agents coordinated a long-term wealth building strategy."
            }
            Goal::General => {
                "The specialist agents coordinated a financial analysis across multiple domains."
            }
        }
    }

    fn plan(self) -> Vec<String> {
        let steps: &[&str] = match self {
            Goal::House => &[
                "Increase savings rate by optimizing discretionary spending",
                "Use a balanced portfolio matched to the down payment timeline",
                "Monitor financial health and keep an emergency fund",
                "Review progress monthly across all areas",
            ],
            Goal::Retirement => &[
                "Maximize tax-advantaged retirement contributions",
                "Optimize the current budget to raise the retirement savings rate",
                "Keep asset allocation appropriate for the timeline",
                "Raise contributions automatically each year",
            ],
            Goal::General => &[
                "Optimize the budget based on spending patterns",
                "Align investments with risk tolerance and goals",
                "Monitor security and overall financial health",
                "Follow a coordinated implementation timeline",
            ],
        };
        steps.iter().map(|s| s.to_string()).collect()
    }
}

fn default_next_actions() -> Vec<String> {
    vec![
        "Review each specialist's recommendations".to_string(),
        "Schedule a follow-up review across all areas".to_string(),
        "Track progress against the plan monthly".to_string(),
    ]
}

pub struct Synthesizer {
    provider: Option<Arc<dyn Provider>>,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(provider: Option<Arc<dyn Provider>>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Merge `outcomes` into one result. Never fails.
    pub async fn synthesize(
        &self,
        query: &str,
        correlation_id: &CorrelationId,
        outcomes: &[DispatchOutcome],
    ) -> SynthesizedResult {
        let findings = collect_findings(outcomes);
        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        let insights = vec![format!(
            "{}/{} agents responded successfully",
            succeeded,
            outcomes.len()
        )];

        if succeeded == 0 {
            tracing::warn!(
                correlation_id = %correlation_id,
                "No successful agent responses, returning degraded result"
            );
            let summary = if outcomes.is_empty() {
                "No agents were available to analyze this request. Please try again later.".to_string()
            } else {
                format!(
                    "None of the specialist agents could complete an analysis. {}",
                    unavailable_lines(&findings).join(" ")
                )
            };
            return SynthesizedResult {
                correlation_id: correlation_id.clone(),
                summary,
                per_agent_findings: findings,
                overall_status: OverallStatus::Degraded,
                detailed_plan: Vec::new(),
                next_actions: vec!["Retry the request once the agents are reachable".to_string()],
                key_insights: insights,
                synthesis: SynthesisSource::Template,
            };
        }

        let all_succeeded = succeeded == outcomes.len();

        if let Some(model) = self.model_synthesis(query, correlation_id, &findings).await {
            let overall_status = if all_succeeded {
                OverallStatus::Success
            } else {
                OverallStatus::PartialSuccess
            };
            let goal = Goal::of(query);
            return SynthesizedResult {
                correlation_id: correlation_id.clone(),
                summary: model.summary,
                per_agent_findings: findings,
                overall_status,
                detailed_plan: if model.detailed_plan.is_empty() {
                    goal.plan()
                } else {
                    model.detailed_plan
                },
                next_actions: if model.next_actions.is_empty() {
                    default_next_actions()
                } else {
                    model.next_actions
                },
                key_insights: insights,
                synthesis: SynthesisSource::Model,
            };
        }

        template_result(query, correlation_id, findings, insights)
    }

    async fn model_synthesis(
        &self,
        query: &str,
        correlation_id: &CorrelationId,
        findings: &BTreeMap<String, Finding>,
    ) -> Option<ModelSynthesis> {
        let provider = self.provider.as_ref()?;

        let available: BTreeMap<&str, &Finding> = findings
            .iter()
            .filter(|(_, f)| f.is_available())
            .map(|(name, f)| (name.as_str(), f))
            .collect();
        let findings_json = serde_json::to_string_pretty(&available).ok()?;
        let prompt = format!(
            "You are a financial coordinator. Combine the specialist findings below into one answer.\n\
             User query: \"{}\"\n\
             Findings:\n{}\n\
             Reply with JSON only: {{\"summary\": string, \"detailed_plan\": [string], \"next_actions\": [string]}}.",
            truncate_chars(query, MAX_QUERY_CHARS),
            truncate_chars(&findings_json, MAX_FINDINGS_CHARS)
        );

        let text = match complete_with_timeout(provider.as_ref(), &prompt, self.timeout).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    provider = provider.name(),
                    "Model synthesis failed, using template: {}",
                    e
                );
                return None;
            }
        };

        match extract_json(&text).map(serde_json::from_value::<ModelSynthesis>) {
            Some(Ok(parsed)) if !parsed.summary.trim().is_empty() => Some(parsed),
            _ => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "Model synthesis output unusable, using template"
                );
                None
            }
        }
    }
}

/// One finding per agent. When an agent appears more than once, an available
/// finding is never replaced by an unavailable one.
fn collect_findings(outcomes: &[DispatchOutcome]) -> BTreeMap<String, Finding> {
    let mut findings: BTreeMap<String, Finding> = BTreeMap::new();
    for outcome in outcomes {
        let finding = Finding::from_outcome(outcome);
        match findings.get(outcome.agent()) {
            Some(existing) if existing.is_available() && !finding.is_available() => {}
            _ => {
                findings.insert(outcome.agent().to_string(), finding);
            }
        }
    }
    findings
}

fn unavailable_lines(findings: &BTreeMap<String, Finding>) -> Vec<String> {
    findings
        .iter()
        .filter_map(|(agent, finding)| match finding {
            Finding::Unavailable { status, detail } if detail.is_empty() => {
                Some(format!("{} unavailable ({}).", agent, status))
            }
            Finding::Unavailable { status, detail } => {
                Some(format!("{} unavailable ({}: {}).", agent, status, detail))
            }
            Finding::Available { .. } => None,
        })
        .collect()
}

fn template_result(
    query: &str,
    correlation_id: &CorrelationId,
    findings: BTreeMap<String, Finding>,
    insights: Vec<String>,
) -> SynthesizedResult {
    let goal = Goal::of(query);
    let mut summary = String::from(goal.headline());

    for (agent, finding) in &findings {
        if let Finding::Available { payload, .. } = finding {
            let body = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            summary.push_str(&format!("\n\n## {}\n{}", agent, body));
        }
    }

    let missing = unavailable_lines(&findings);
    if !missing.is_empty() {
        summary.push_str("\n\n## Unavailable\n");
        summary.push_str(&missing.join("\n"));
    }

    SynthesizedResult {
        correlation_id: correlation_id.clone(),
        summary,
        per_agent_findings: findings,
        overall_status: OverallStatus::Degraded,
        detailed_plan: goal.plan(),
        next_actions: default_next_actions(),
        key_insights: insights,
        synthesis: SynthesisSource::Template,
    }
}
