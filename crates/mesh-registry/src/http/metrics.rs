//! `/metrics` (§6 Kubernetes probes: "emits Prometheus text"), built on
//! `prometheus-client`, the same crate the teacher depends on for its own
//! metrics surface.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

pub struct RegistryMetrics {
    registry: Registry,
    pub registrations_total: Counter,
    pub heartbeats_total: Counter,
    pub agents_current: Gauge,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let registrations_total = Counter::default();
        let heartbeats_total = Counter::default();
        let agents_current = Gauge::default();

        registry.register(
            "mesh_registry_registrations",
            "Total agent registrations processed",
            registrations_total.clone(),
        );
        registry.register(
            "mesh_registry_heartbeats",
            "Total heartbeats processed",
            heartbeats_total.clone(),
        );
        registry.register(
            "mesh_registry_agents",
            "Current number of tracked agents",
            agents_current.clone(),
        );

        Self {
            registry,
            registrations_total,
            heartbeats_total,
            agents_current,
        }
    }

    pub fn encode(&self) -> String {
        let mut buf = String::new();
        let _ = encode(&mut buf, &self.registry);
        buf
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}
