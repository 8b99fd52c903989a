//! Registry storage (§4.D): agents, tools, capabilities, health timestamps,
//! and the secondary indexes the resolver queries.
//!
//! Mirrors the teacher's `RegistryStore` (`mcp/registry/store.rs`) in
//! technique: an immutable snapshot behind `ArcSwap` so reads never block,
//! with writers rebuilding and swapping a fresh snapshot. Here the snapshot
//! is the whole agent population rather than a compiled tool registry, and
//! mutations are additionally serialized per agent id (spec.md §4.D
//! "Mutations are serialized per agent (keyed lock)") via a small map of
//! per-agent `tokio::sync::Mutex` guards.

mod health;
mod snapshot;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use parking_lot::Mutex as SyncMutex;
use semver::{Version, VersionReq};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tracing::info;

pub use health::{HealthSweep, HealthSweepHandle};
pub use snapshot::RegistrySnapshot;

use mesh_core::wire::{AgentMetadata, DependencySpec, ProxyKwargs, ToolSpec};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid tool version '{0}': {1}")]
    InvalidVersion(String, semver::Error),
    #[error("invalid dependency constraint '{0}': {1}")]
    InvalidConstraint(String, semver::Error),
    #[error("duplicate function_name '{0}' within agent")]
    DuplicateFunctionName(String),
    #[error("agent '{0}' not found")]
    NotFound(String),
}

/// Registry-side floors for agent-declared thresholds (§4.D "Thresholds are
/// per-agent ... with registry-side floors").
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub default_timeout_threshold: Duration,
    pub default_eviction_threshold: Duration,
    pub min_timeout_threshold: Duration,
    pub min_eviction_threshold: Duration,
    pub health_sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout_threshold: Duration::from_secs(60),
            default_eviction_threshold: Duration::from_secs(120),
            min_timeout_threshold: Duration::from_secs(5),
            min_eviction_threshold: Duration::from_secs(10),
            health_sweep_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
}

/// The authoritative, server-side representation of one agent.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub agent_id: String,
    pub name: String,
    pub namespace: Option<String>,
    pub endpoint: String,
    pub version: String,
    pub timeout_threshold: Duration,
    pub eviction_threshold: Duration,
    pub tools: Vec<ToolRecord>,
    pub created_at: u64,
    pub last_heartbeat: u64,
    pub resource_version: u64,
    pub health: HealthState,
}

impl AgentRecord {
    pub fn tool(&self, function_name: &str) -> Option<&ToolRecord> {
        self.tools.iter().find(|t| t.function_name == function_name)
    }
}

#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub function_name: String,
    pub capability: String,
    pub version: Version,
    pub version_raw: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub input_schema: Option<serde_json::Value>,
    pub dependencies: Vec<DependencyRecord>,
}

#[derive(Debug, Clone)]
pub struct DependencyRecord {
    pub capability: String,
    pub constraint: Option<VersionReq>,
    pub tags: Vec<String>,
    pub kwargs: ProxyKwargs,
    pub slot: String,
    pub max_providers: u32,
}

impl DependencyRecord {
    fn from_spec(spec: &DependencySpec) -> Result<Self, StoreError> {
        let constraint = spec
            .version
            .as_deref()
            .map(|raw| {
                VersionReq::parse(raw).map_err(|e| StoreError::InvalidConstraint(raw.to_string(), e))
            })
            .transpose()?;
        Ok(Self {
            capability: spec.capability.clone(),
            constraint,
            tags: spec.tags.clone(),
            kwargs: spec.kwargs.clone(),
            slot: spec.slot_name().to_string(),
            max_providers: spec.max_providers.unwrap_or(1).max(1),
        })
    }

    /// Inverse of `from_spec`, used by the durable-backing paths to
    /// rebuild a `ToolSpec`'s dependency declarations out of `AgentRecord`
    /// state on snapshot write / log replay, rather than dropping them.
    pub fn to_spec(&self) -> DependencySpec {
        DependencySpec {
            capability: self.capability.clone(),
            version: self.constraint.as_ref().map(|c| c.to_string()),
            tags: self.tags.clone(),
            kwargs: self.kwargs.clone(),
            slot: Some(self.slot.clone()),
            max_providers: Some(self.max_providers),
        }
    }
}

impl ToolRecord {
    fn from_spec(spec: &ToolSpec) -> Result<Self, StoreError> {
        let version = Version::parse(&spec.version)
            .map_err(|e| StoreError::InvalidVersion(spec.version.clone(), e))?;
        let dependencies = spec
            .dependencies
            .iter()
            .map(DependencyRecord::from_spec)
            .collect::<Result<_, _>>()?;
        Ok(Self {
            function_name: spec.function_name.clone(),
            capability: spec.capability.clone(),
            version,
            version_raw: spec.version.clone(),
            tags: spec.tags.clone(),
            description: spec.description.clone(),
            input_schema: spec.input_schema.clone(),
            dependencies,
        })
    }
}

#[derive(Debug, Clone)]
pub enum RegistryEventKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub agent: Arc<AgentRecord>,
    pub timestamp: u64,
}

/// The registry's authoritative agent population.
pub struct AgentStore {
    current: ArcSwap<RegistrySnapshot>,
    /// Per-agent-id write serialization (§4.D keyed lock): orders repeated
    /// writes to the *same* agent (e.g. a heartbeat racing a re-registration).
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Guards the load -> clone -> rebuild -> store sequence against *other*
    /// agents' writers. The per-agent lock above only orders writers that
    /// target the same key; two different agent ids hold different keyed
    /// locks and can otherwise both load the same snapshot and clobber each
    /// other's insert on `current.store` (lost update). This mutex is held
    /// only across that short rebuild, never across an `.await` that waits
    /// on anything else, so it adds no cross-agent blocking beyond the
    /// rebuild itself.
    write_lock: AsyncMutex<()>,
    events: broadcast::Sender<RegistryEvent>,
    config: RegistryConfig,
}

impl std::fmt::Debug for AgentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStore")
            .field("agent_count", &self.current.load().agents.len())
            .finish()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl AgentStore {
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            current: ArcSwap::new(Arc::new(RegistrySnapshot::empty())),
            locks: SyncMutex::new(HashMap::new()),
            write_lock: AsyncMutex::new(()),
            events: tx,
            config,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Lock-free read of the current population (§4.D "Reads are
    /// lock-free and may observe a stale resource version").
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn lock_for(&self, agent_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Register (or replace) an agent. Returns the new resource version.
    ///
    /// Re-registration with the same `agent_id` replaces the prior record
    /// atomically (§3 invariant); no tool from the prior registration is
    /// observable once this returns (§8 invariant 3).
    pub async fn upsert_agent(
        &self,
        agent_id: &str,
        metadata: &AgentMetadata,
    ) -> Result<u64, StoreError> {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;

        let tools = metadata
            .tools
            .iter()
            .map(ToolRecord::from_spec)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = std::collections::HashSet::new();
        for t in &tools {
            if !seen.insert(t.function_name.clone()) {
                return Err(StoreError::DuplicateFunctionName(t.function_name.clone()));
            }
        }

        let now = now_secs();
        let timeout_threshold = metadata
            .timeout_threshold
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_timeout_threshold)
            .max(self.config.min_timeout_threshold);
        let eviction_threshold = metadata
            .eviction_threshold
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_eviction_threshold)
            .max(self.config.min_eviction_threshold);

        // Serialize against every other agent's writer too, not just this
        // agent's: two different agent ids writing concurrently must not
        // both load the same snapshot and clobber each other's insert.
        let _write_guard = self.write_lock.lock().await;

        let old = self.current.load();
        let prior_version = old.agents.get(agent_id).map(|a| a.resource_version);
        let resource_version = prior_version.map(|v| v + 1).unwrap_or(1);
        let created_at = old
            .agents
            .get(agent_id)
            .map(|a| a.created_at)
            .unwrap_or(now);

        let record = Arc::new(AgentRecord {
            agent_id: agent_id.to_string(),
            name: metadata.name.clone(),
            namespace: metadata.namespace.clone(),
            endpoint: metadata.endpoint.clone(),
            version: metadata.version.clone(),
            timeout_threshold,
            eviction_threshold,
            tools,
            created_at,
            last_heartbeat: now,
            resource_version,
            health: HealthState::Healthy,
        });

        let mut next = (*old).clone_agents();
        let is_new = !next.contains_key(agent_id);
        next.insert(agent_id.to_string(), record.clone());
        let snapshot = RegistrySnapshot::build(next);
        self.current.store(Arc::new(snapshot));
        drop(_write_guard);

        let _ = self.events.send(RegistryEvent {
            kind: if is_new {
                RegistryEventKind::Added
            } else {
                RegistryEventKind::Modified
            },
            agent: record,
            timestamp: now,
        });

        info!(target: "mesh_registry", agent_id, resource_version, "agent registered");
        Ok(resource_version)
    }

    /// Record a heartbeat for an already-registered agent, refreshing
    /// `last_heartbeat` and clearing `degraded` status. Returns the current
    /// resource version, or `StoreError::NotFound` if the agent is
    /// unknown (the caller should re-register in that case, per §4.B
    /// "Exceeding a configurable failure threshold triggers
    /// re-registration").
    pub async fn touch_heartbeat(&self, agent_id: &str) -> Result<u64, StoreError> {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;
        let _write_guard = self.write_lock.lock().await;

        let old = self.current.load();
        let Some(existing) = old.agents.get(agent_id).cloned() else {
            return Err(StoreError::NotFound(agent_id.to_string()));
        };

        let now = now_secs();
        let mut updated = (*existing).clone();
        updated.last_heartbeat = now;
        updated.health = HealthState::Healthy;
        let record = Arc::new(updated);

        let mut next = (*old).clone_agents();
        next.insert(agent_id.to_string(), record.clone());
        let snapshot = RegistrySnapshot::build(next);
        self.current.store(Arc::new(snapshot));
        drop(_write_guard);

        let _ = self.events.send(RegistryEvent {
            kind: RegistryEventKind::Modified,
            agent: record,
            timestamp: now,
        });

        Ok(existing.resource_version)
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<AgentRecord>> {
        self.current.load().agents.get(agent_id).cloned()
    }

    /// Used by the health sweep: transition or evict one agent under its
    /// own lock, returning the event produced (if any).
    pub(crate) async fn apply_health_transition(
        &self,
        agent_id: &str,
        now: u64,
    ) -> Option<RegistryEvent> {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;
        let _write_guard = self.write_lock.lock().await;

        let old = self.current.load();
        let existing = old.agents.get(agent_id)?.clone();
        let age = now.saturating_sub(existing.last_heartbeat);

        if age as u64 > existing.eviction_threshold.as_secs() {
            let mut next = (*old).clone_agents();
            next.remove(agent_id);
            let snapshot = RegistrySnapshot::build(next);
            self.current.store(Arc::new(snapshot));
            drop(_write_guard);
            let event = RegistryEvent {
                kind: RegistryEventKind::Deleted,
                agent: existing,
                timestamp: now,
            };
            let _ = self.events.send(event.clone());
            self.locks.lock().remove(agent_id);
            return Some(event);
        }

        if age as u64 > existing.timeout_threshold.as_secs() && existing.health == HealthState::Healthy {
            let mut updated = (*existing).clone();
            updated.health = HealthState::Degraded;
            let record = Arc::new(updated);

            let mut next = (*old).clone_agents();
            next.insert(agent_id.to_string(), record.clone());
            let snapshot = RegistrySnapshot::build(next);
            self.current.store(Arc::new(snapshot));
            drop(_write_guard);

            let event = RegistryEvent {
                kind: RegistryEventKind::Modified,
                agent: record,
                timestamp: now,
            };
            let _ = self.events.send(event.clone());
            return Some(event);
        }

        None
    }

    pub(crate) fn agent_ids(&self) -> Vec<String> {
        self.current.load().agents.keys().cloned().collect()
    }

    /// Remove an agent outright, independent of health-sweep eviction.
    /// Used when replaying a durable log's `Deleted` tail (`durable::AppendLog`).
    pub async fn remove_agent(&self, agent_id: &str) {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;
        let _write_guard = self.write_lock.lock().await;

        let old = self.current.load();
        if !old.agents.contains_key(agent_id) {
            return;
        }
        let mut next = (*old).clone_agents();
        next.remove(agent_id);
        let snapshot = RegistrySnapshot::build(next);
        self.current.store(Arc::new(snapshot));
        drop(_write_guard);
        self.locks.lock().remove(agent_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::wire::ToolSpec;

    fn meta(name: &str, endpoint: &str) -> AgentMetadata {
        AgentMetadata {
            name: name.to_string(),
            namespace: None,
            endpoint: endpoint.to_string(),
            version: "1.0.0".to_string(),
            timeout_threshold: Some(60),
            eviction_threshold: Some(120),
            tools: vec![ToolSpec {
                function_name: "greet".to_string(),
                capability: "greeting".to_string(),
                version: "1.0.0".to_string(),
                tags: vec![],
                description: None,
                input_schema: None,
                dependencies: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn register_then_reregister_bumps_version_and_replaces_tools() {
        let store = AgentStore::new(RegistryConfig::default());
        let v1 = store.upsert_agent("greeter-aaaaaaaa", &meta("greeter", "http://a")).await.unwrap();
        assert_eq!(v1, 1);

        let mut second = meta("greeter", "http://a");
        second.tools[0].function_name = "greet_v2".to_string();
        let v2 = store.upsert_agent("greeter-aaaaaaaa", &second).await.unwrap();
        assert_eq!(v2, 2);

        let record = store.get("greeter-aaaaaaaa").unwrap();
        assert_eq!(record.tools.len(), 1);
        assert_eq!(record.tools[0].function_name, "greet_v2");
    }

    #[tokio::test]
    async fn duplicate_function_name_is_rejected() {
        let store = AgentStore::new(RegistryConfig::default());
        let mut m = meta("greeter", "http://a");
        m.tools.push(m.tools[0].clone());
        let err = store.upsert_agent("greeter-aaaaaaaa", &m).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFunctionName(_)));
    }

    #[tokio::test]
    async fn heartbeat_unknown_agent_errors() {
        let store = AgentStore::new(RegistryConfig::default());
        let err = store.touch_heartbeat("nobody").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_registrations_of_different_agents_both_succeed() {
        let store = AgentStore::new(RegistryConfig::default());
        let (a, b) = tokio::join!(
            store.upsert_agent("agent-a", &meta("a", "http://a")),
            store.upsert_agent("agent-b", &meta("b", "http://b")),
        );
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(store.snapshot().agents.len(), 2);
    }

    /// Regression test for a lost-update race: on the multi-thread runtime
    /// `mesh-registryd` actually uses, many distinct agent ids registering
    /// at once must all land in the final snapshot. A current-thread
    /// runtime never interleaves the load/store pair, so this needs real
    /// parallelism to catch a missing write-serialization fix.
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn many_concurrent_registrations_of_distinct_agents_all_land() {
        let store = AgentStore::new(RegistryConfig::default());
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("agent-{i}");
                store
                    .upsert_agent(&id, &meta(&id, &format!("http://{id}")))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.snapshot().agents.len(), 64);
    }
}
