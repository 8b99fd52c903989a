//! Background health sweep (§4.D "Health evaluation"): every
//! `health_sweep_interval`, degrade or evict agents whose `last_heartbeat`
//! has aged past threshold. Produces at most one event per agent per sweep
//! (§4.F "must produce at most one DELETED event per eviction").

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::AgentStore;

pub struct HealthSweep {
    store: Arc<AgentStore>,
}

/// Handle to a running sweep task; dropping it does not stop the task —
/// call `abort()` for that, mirroring `tokio::task::JoinHandle` ownership.
pub struct HealthSweepHandle {
    pub join: JoinHandle<()>,
}

impl HealthSweepHandle {
    pub fn abort(&self) {
        self.join.abort();
    }
}

impl HealthSweep {
    pub fn new(store: Arc<AgentStore>) -> Self {
        Self { store }
    }

    pub fn spawn(self) -> HealthSweepHandle {
        let interval = self.store.config().health_sweep_interval;
        let join = tokio::spawn(async move {
            info!(target: "mesh_registry", ?interval, "starting health sweep loop");
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep_once().await;
            }
        });
        HealthSweepHandle { join }
    }

    pub async fn sweep_once(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        for agent_id in self.store.agent_ids() {
            if let Some(event) = self.store.apply_health_transition(&agent_id, now).await {
                debug!(target: "mesh_registry", agent_id = %event.agent.agent_id, kind = ?event.kind, "health transition");
            }
        }
    }
}
