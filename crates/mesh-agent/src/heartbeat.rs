//! The heartbeat pipeline (§4.B): a single cooperative task that contacts
//! the registry on a fixed interval, applies resolution deltas, and swaps
//! fresh RPC proxies into the agent's `ResolutionSnapshot`.
//!
//! **(SUPPLEMENT collapse, documented in DESIGN.md)** `SPEC_FULL.md` §4.B
//! describes an internal fast/full heartbeat split mirroring the original
//! source's cheap liveness probe. Since this registry's `/heartbeat`
//! already does a lock-free resolve behind a per-agent keyed write lock
//! (`mesh_registry::store::AgentStore::touch_heartbeat`), there is no
//! cheaper probe to fall back to — the split collapses to always sending
//! the full heartbeat, which is what this pipeline does. The resolution
//! delta hash (below) still gives the "skip the expensive part" behavior
//! the supplement was after, just on the agent side instead of a second
//! registry round-trip.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mesh_core::wire::{AgentMetadata, DependenciesResolved, HealthStatus};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::registry_client::RegistryClient;
use crate::resolution::{DependencySlots, ResolutionMap, ResolutionSnapshot};
use crate::proxy::RpcProxy;

/// Consecutive heartbeat failures before the pipeline falls back to a full
/// re-registration (§4.B "Exceeding a configurable failure threshold
/// triggers re-registration").
const REREGISTER_AFTER_FAILURES: u32 = 3;

fn hash_resolution(resolved: &DependenciesResolved) -> u64 {
    // `DependenciesResolved` serializes deterministically (§4.E "Resolver
    // output is a deterministic function of (agent request, storage
    // snapshot)"), so hashing its canonical JSON form is a correct and
    // cheap way to detect "nothing changed" (§4.B "keeps a hash of the
    // last-applied ... payload").
    let json = serde_json::to_string(resolved).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    hasher.finish()
}

pub struct HeartbeatPipeline {
    agent_id: String,
    registry: RegistryClient,
    interval: Duration,
    metadata: AgentMetadata,
    resolution: Arc<ResolutionSnapshot>,
    last_hash: Mutex<Option<u64>>,
    consecutive_failures: AtomicU64,
}

impl HeartbeatPipeline {
    pub fn new(
        agent_id: String,
        registry: RegistryClient,
        interval: Duration,
        metadata: AgentMetadata,
        resolution: Arc<ResolutionSnapshot>,
    ) -> Self {
        Self {
            agent_id,
            registry,
            interval,
            metadata,
            resolution,
            last_hash: Mutex::new(None),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// Spawn the cooperative loop. The returned `JoinHandle`'s abort is the
    /// clean-cancellation point (§5 "cancellation at any await is clean").
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(target: "mesh_agent_heartbeat", agent_id = %self.agent_id, interval = ?self.interval, "heartbeat pipeline started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await; // first tick fires immediately; skip it, startup already registered.
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    pub async fn tick(&self) {
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        let result = if failures >= REREGISTER_AFTER_FAILURES as u64 {
            warn!(target: "mesh_agent_heartbeat", agent_id = %self.agent_id, failures, "re-registering after repeated heartbeat failures");
            self.registry.register(&self.agent_id, &self.metadata).await
        } else {
            self.registry
                .heartbeat(&self.agent_id, HealthStatus::default())
                .await
        };

        match result {
            Ok(resp) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.apply_resolution(resp.metadata.dependencies_resolved).await;
            }
            Err(e) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                warn!(target: "mesh_agent_heartbeat", agent_id = %self.agent_id, "heartbeat failed: {e}");
                // §7: "all errors are caught at the tick boundary; none
                // propagate out" -- the next tick proceeds regardless.
            }
        }
    }

    async fn apply_resolution(&self, resolved: DependenciesResolved) {
        let hash = hash_resolution(&resolved);
        let mut last = self.last_hash.lock().await;
        if *last == Some(hash) {
            return; // §8 invariant 5: unchanged hash recreates no proxies.
        }
        *last = Some(hash);
        drop(last);

        let mut map = ResolutionMap::new();
        for (function_name, slots) in resolved {
            let mut proxies = std::collections::HashMap::new();
            for (slot, resolved_slot) in slots {
                let entry = resolved_slot.primary().clone();
                proxies.insert(slot, Arc::new(RpcProxy::new(entry)));
            }
            map.insert(function_name, Arc::new(DependencySlots::from_proxies(proxies)));
        }
        let bound_slots: usize = map.values().map(|s| if s.is_empty() { 0 } else { 1 }).sum();
        info!(target: "mesh_agent_heartbeat", agent_id = %self.agent_id, tools_with_bindings = bound_slots, "applied resolution delta");
        self.resolution.swap(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::wire::{ProxyKwargs, ResolvedEntry, ResolvedSlot};

    fn metadata() -> AgentMetadata {
        AgentMetadata {
            name: "greeter".to_string(),
            namespace: None,
            endpoint: "http://greeter:8080".to_string(),
            version: "1.0.0".to_string(),
            timeout_threshold: None,
            eviction_threshold: None,
            tools: vec![],
        }
    }

    #[test]
    fn hash_is_stable_across_equal_payloads() {
        let mut resolved = DependenciesResolved::new();
        let mut slots = std::collections::HashMap::new();
        slots.insert(
            "date_service".to_string(),
            ResolvedSlot::Single(ResolvedEntry {
                agent_id: "clock-bbbbbbbb".to_string(),
                function_name: "get_current_date".to_string(),
                capability: "date_service".to_string(),
                version: "1.2.0".to_string(),
                endpoint: "http://clock:8080".to_string(),
                kwargs: ProxyKwargs::default(),
            }),
        );
        resolved.insert("greet".to_string(), slots.clone());

        let mut resolved2 = DependenciesResolved::new();
        resolved2.insert("greet".to_string(), slots);

        assert_eq!(hash_resolution(&resolved), hash_resolution(&resolved2));
    }

    #[tokio::test]
    async fn unresolved_dependency_leaves_slot_unbound() {
        let resolution = Arc::new(ResolutionSnapshot::empty());
        let pipeline = HeartbeatPipeline::new(
            "greeter-aaaaaaaa".to_string(),
            RegistryClient::new("http://unused"),
            Duration::from_secs(15),
            metadata(),
            resolution.clone(),
        );
        pipeline.apply_resolution(DependenciesResolved::new()).await;
        let slots = resolution.slots_for("greet");
        assert!(slots.get("date_service").is_none());
    }
}
