//! Fan-out of one plan to many agents, and the advise pipeline on top of it.

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CoordinatorSettings, Settings};
use crate::dispatch::{DispatchOutcome, DispatchStatus, Dispatcher};
use crate::error::{Error, Result};
use crate::planner::{CoordinationPlan, PlanTarget, Planner};
use crate::protocol::{Envelope, Payload};
use crate::providers::create_provider;
use crate::registry::{AgentEntry, AgentRegistry};
use crate::synthesis::{SynthesizedResult, Synthesizer};

/// Upper bound on retries per target, whatever the settings say.
const MAX_RETRIES: u32 = 1;

/// Dispatches every target of a plan concurrently and collects one outcome
/// per target.
pub struct Coordinator {
    registry: Arc<AgentRegistry>,
    dispatcher: Dispatcher,
    sender: String,
    retries: u32,
    backoff: Duration,
    round_margin: Duration,
}

impl Coordinator {
    pub fn new(registry: Arc<AgentRegistry>, dispatcher: Dispatcher, sender: impl Into<String>) -> Self {
        Self {
            registry,
            dispatcher,
            sender: sender.into(),
            retries: MAX_RETRIES,
            backoff: Duration::from_millis(250),
            round_margin: Duration::from_millis(500),
        }
    }

    pub fn from_settings(
        registry: Arc<AgentRegistry>,
        dispatcher: Dispatcher,
        settings: &CoordinatorSettings,
    ) -> Self {
        Self::new(registry, dispatcher, settings.agent_id.clone())
            .with_retries(settings.retries)
            .with_backoff(Duration::from_millis(settings.retry_backoff_ms))
            .with_round_margin(Duration::from_millis(settings.round_margin_ms))
    }

    /// Retries for timeouts and transport errors, clamped to one.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries.min(MAX_RETRIES);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_round_margin(mut self, margin: Duration) -> Self {
        self.round_margin = margin;
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Send `payload` to every plan target and wait for all of them.
    ///
    /// Returns exactly one outcome per target, in plan order. Targets the
    /// registry cannot resolve get a local `TransportError` without touching
    /// the network. One slow agent never delays another past the round
    /// deadline.
    pub async fn coordinate(&self, plan: &CoordinationPlan, payload: &Payload) -> Vec<DispatchOutcome> {
        let agents = self.registry.snapshot();

        let resolved: Vec<Option<&AgentEntry>> =
            plan.targets.iter().map(|t| agents.get(&t.agent)).collect();
        let deadline = Instant::now() + self.round_budget(resolved.iter().flatten().map(|e| e.timeout));

        let rounds = plan.targets.iter().zip(resolved).map(|(target, entry)| async move {
            match entry {
                Some(entry) => self.dispatch_target(plan, target, entry, payload, deadline).await,
                None => {
                    tracing::warn!(
                        agent = %target.agent,
                        correlation_id = %plan.correlation_id,
                        "Agent not in registry"
                    );
                    DispatchOutcome::unresolved(
                        target.agent.clone(),
                        plan.correlation_id.clone(),
                        target.message_type.clone(),
                        format!("agent '{}' is not registered", target.agent),
                    )
                }
            }
        });
        let outcomes = join_all(rounds).await;

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(
            correlation_id = %plan.correlation_id,
            "Coordination round finished: {}/{} succeeded",
            succeeded,
            outcomes.len()
        );
        outcomes
    }

    /// `max(per-agent timeout) * (1 + retries)`, plus the backoff sleeps and
    /// the margin.
    fn round_budget(&self, timeouts: impl Iterator<Item = Duration>) -> Duration {
        let slowest = timeouts.max().unwrap_or_default();
        slowest * (1 + self.retries) + self.backoff * self.retries + self.round_margin
    }

    async fn dispatch_target(
        &self,
        plan: &CoordinationPlan,
        target: &PlanTarget,
        entry: &AgentEntry,
        payload: &Payload,
        deadline: Instant,
    ) -> DispatchOutcome {
        let envelope = match Envelope::new(
            self.sender.as_str(),
            target.agent.as_str(),
            target.message_type.clone(),
            payload.clone(),
            Some(plan.correlation_id.clone()),
        ) {
            Ok(envelope) => envelope,
            Err(e) => {
                return DispatchOutcome::unresolved(
                    target.agent.clone(),
                    plan.correlation_id.clone(),
                    target.message_type.clone(),
                    e.to_string(),
                )
            }
        };

        if let Some(caps) = &entry.capabilities {
            if !caps.supports(&target.message_type) {
                tracing::debug!(
                    agent = %target.agent,
                    message_type = %target.message_type,
                    "Agent does not advertise this message type; it will use its default"
                );
            }
        }

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());

            let outcome = if remaining.is_zero() {
                DispatchOutcome::failure(
                    &envelope,
                    DispatchStatus::Timeout,
                    "round deadline reached before the attempt started",
                    Duration::ZERO,
                )
            } else {
                self.dispatcher
                    .dispatch(&envelope, &entry.endpoint, entry.timeout.min(remaining))
                    .await
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if outcome.status().is_retryable() && attempt <= self.retries && !remaining.is_zero() {
                tracing::warn!(
                    agent = %target.agent,
                    correlation_id = %plan.correlation_id,
                    status = %outcome.status(),
                    "Retrying after {:?}",
                    self.backoff
                );
                tokio::time::sleep(self.backoff.min(remaining)).await;
                continue;
            }

            return outcome.with_attempts(attempt).with_elapsed(started.elapsed());
        }
    }
}

/// Query in, advice out: plan, coordinate, synthesize.
pub struct Advisor {
    registry: Arc<AgentRegistry>,
    planner: Planner,
    coordinator: Coordinator,
    synthesizer: Synthesizer,
    client: Client,
    discovery_timeout: Duration,
}

impl Advisor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        planner: Planner,
        coordinator: Coordinator,
        synthesizer: Synthesizer,
        client: Client,
    ) -> Self {
        Self {
            registry,
            planner,
            coordinator,
            synthesizer,
            client,
            discovery_timeout: Duration::from_secs(5),
        }
    }

    /// Wire up every component from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("finadvisor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let registry = Arc::new(AgentRegistry::from_settings(settings)?);
        let provider = create_provider(&settings.models, client.clone());
        let model_timeout = settings.models.timeout();

        let planner = Planner::new(provider.clone(), model_timeout);
        let synthesizer = Synthesizer::new(provider, model_timeout);
        let coordinator = Coordinator::from_settings(
            Arc::clone(&registry),
            Dispatcher::new(client.clone()),
            &settings.coordinator,
        );

        let mut advisor = Self::new(registry, planner, coordinator, synthesizer, client);
        advisor.discovery_timeout = settings.coordinator.request_timeout().min(Duration::from_secs(10));
        Ok(advisor)
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Sender name stamped on outgoing envelopes.
    pub fn agent_id(&self) -> &str {
        self.coordinator.sender()
    }

    /// Refresh agent capabilities. Returns how many agents answered.
    pub async fn discover(&self) -> usize {
        self.registry.discover(&self.client, self.discovery_timeout).await
    }

    /// Answer one query. Fails only when no agents are registered; every
    /// downstream failure is folded into the result.
    pub async fn advise(&self, query: &str, financial_data: Option<Value>) -> Result<SynthesizedResult> {
        let available = self.registry.names();
        if available.is_empty() {
            return Err(Error::NoAgentsAvailable);
        }

        let plan = self.planner.plan(query, &available).await;
        tracing::info!(
            correlation_id = %plan.correlation_id,
            source = ?plan.source,
            agents = ?plan.agents(),
            "Coordinating query"
        );

        let mut payload = Payload::for_query(query);
        if let Some(data) = financial_data {
            payload = payload.with_financial_data(data);
        }

        let outcomes = self.coordinator.coordinate(&plan, &payload).await;
        let result = self
            .synthesizer
            .synthesize(query, &plan.correlation_id, &outcomes)
            .await;

        tracing::info!(
            correlation_id = %result.correlation_id,
            status = ?result.overall_status,
            synthesis = ?result.synthesis,
            "Advice ready: {}/{} agents contributed",
            result.successful_agents(),
            result.per_agent_findings.len()
        );
        Ok(result)
    }
}
