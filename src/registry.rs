//! Agent registry: logical agent name to network address.
//!
//! Readers take a cheap snapshot (`Arc` clone) and never hold the lock while
//! doing I/O. Refreshes build a whole new map and swap it in, so a reader
//! never observes a half-updated registry.

use futures::future::join_all;
use reqwest::{Client, Url};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::protocol::{AgentCapabilities, CAPABILITIES_PATH, PROTOCOL_VERSION};

/// One addressable specialist.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentEntry {
    pub name: String,
    pub endpoint: Url,
    /// Per-call timeout for dispatches to this agent.
    pub timeout: Duration,
    /// Filled in by [`AgentRegistry::discover`].
    pub capabilities: Option<AgentCapabilities>,
}

impl AgentEntry {
    pub fn new(name: impl Into<String>, endpoint: Url, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            endpoint,
            timeout,
            capabilities: None,
        }
    }

    /// Absolute URL of a protocol path on this agent.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path)
    }
}

type Entries = Arc<BTreeMap<String, AgentEntry>>;

#[derive(Debug, Default)]
pub struct AgentRegistry {
    entries: RwLock<Entries>,
}

impl AgentRegistry {
    pub fn new(entries: impl IntoIterator<Item = AgentEntry>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(index(entries))),
        }
    }

    /// Build from the enabled agents in settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut entries = Vec::new();
        for (name, agent) in settings.agents.iter().filter(|(_, a)| a.enabled) {
            let endpoint = Url::parse(&agent.url)
                .map_err(|e| Error::Config(format!("agent '{}' url: {}", name, e)))?;
            entries.push(AgentEntry::new(name.clone(), endpoint, settings.timeout_for(name)));
        }
        Ok(Self::new(entries))
    }

    /// Current contents. Cheap; the map itself is shared.
    pub fn snapshot(&self) -> Entries {
        match self.entries.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<AgentEntry> {
        self.snapshot().get(name).cloned()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Replace every entry in one atomic swap.
    pub fn replace(&self, entries: impl IntoIterator<Item = AgentEntry>) {
        let next = Arc::new(index(entries));
        match self.entries.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Probe `/a2a/capabilities` on every agent concurrently and publish the
    /// results. Agents that fail to answer keep no capabilities. Returns how
    /// many agents answered.
    pub async fn discover(&self, client: &Client, timeout: Duration) -> usize {
        let current = self.snapshot();

        let probes = current.values().map(|entry| async move {
            let caps = fetch_capabilities(client, entry, timeout).await;
            (entry.name.clone(), caps)
        });
        let results = join_all(probes).await;

        let mut discovered = 0;
        let mut next: Vec<AgentEntry> = Vec::with_capacity(results.len());
        for (name, caps) in results {
            let Some(mut entry) = current.get(&name).cloned() else {
                continue;
            };
            match caps {
                Ok(caps) => {
                    if caps.protocol_version != PROTOCOL_VERSION {
                        tracing::warn!(
                            agent = %name,
                            version = %caps.protocol_version,
                            "Agent advertises an unsupported protocol version"
                        );
                    }
                    tracing::debug!(
                        agent = %name,
                        types = caps.supported_message_types.len(),
                        "Discovered capabilities"
                    );
                    entry.capabilities = Some(caps);
                    discovered += 1;
                }
                Err(e) => {
                    tracing::warn!(agent = %name, "Capability discovery failed: {}", e);
                    entry.capabilities = None;
                }
            }
            next.push(entry);
        }

        self.replace(next);
        discovered
    }
}

async fn fetch_capabilities(
    client: &Client,
    entry: &AgentEntry,
    timeout: Duration,
) -> Result<AgentCapabilities> {
    let response = client
        .get(entry.url_for(CAPABILITIES_PATH))
        .timeout(timeout)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Web(format!("HTTP {}", response.status())));
    }

    Ok(response.json::<AgentCapabilities>().await?)
}

fn index(entries: impl IntoIterator<Item = AgentEntry>) -> BTreeMap<String, AgentEntry> {
    entries.into_iter().map(|e| (e.name.clone(), e)).collect()
}
