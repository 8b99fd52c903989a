//! The agent's current view of its resolved dependencies (§4.B "Resolution
//! delta application", §5 "read-mostly mechanism"): an immutable snapshot
//! swapped under `ArcSwap`, the same technique the teacher's `RegistryStore`
//! uses for its compiled tool registry (`ArcSwap<Option<Arc<CompiledRegistry>>>`
//! in `mcp/registry/store.rs`), applied here to a per-(tool, slot) proxy map.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::proxy::RpcProxy;

/// The dependency slots bound for one tool, keyed by slot name (§4.E
/// "Per-agent output": `dep_slot_name` is the capability or the declared
/// parameter name).
#[derive(Default)]
pub struct DependencySlots {
    proxies: HashMap<String, Arc<RpcProxy>>,
}

impl DependencySlots {
    pub(crate) fn from_proxies(proxies: HashMap<String, Arc<RpcProxy>>) -> Self {
        Self { proxies }
    }

    /// The bound proxy for `slot`, or `None` if the dependency is
    /// currently unresolved — the tool is responsible for its own
    /// graceful path in that case (§7 "User-visible behavior").
    pub fn get(&self, slot: &str) -> Option<Arc<RpcProxy>> {
        self.proxies.get(slot).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// `function_name -> DependencySlots`, the shape the runtime hands to a
/// tool handler alongside the caller's own arguments.
pub type ResolutionMap = HashMap<String, Arc<DependencySlots>>;

/// The agent's live resolution state. Readers (tool handlers) call
/// `slots_for` and never block; the heartbeat task is the only writer
/// (§5 "Shared-resource policy").
pub struct ResolutionSnapshot {
    current: ArcSwap<ResolutionMap>,
}

impl ResolutionSnapshot {
    pub fn empty() -> Self {
        Self {
            current: ArcSwap::new(Arc::new(ResolutionMap::new())),
        }
    }

    /// The dependency slots bound for `function_name`; an empty
    /// `DependencySlots` (not a missing entry) if the tool has no
    /// resolved dependencies yet.
    pub fn slots_for(&self, function_name: &str) -> Arc<DependencySlots> {
        self.current
            .load()
            .get(function_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Atomically replace the whole resolution map (§4.B "Ordering
    /// guarantees": in-flight calls against old proxies complete against
    /// their old endpoint because the swap only affects *new* lookups).
    pub fn swap(&self, next: ResolutionMap) {
        self.current.store(Arc::new(next));
    }
}

impl Default for ResolutionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}
