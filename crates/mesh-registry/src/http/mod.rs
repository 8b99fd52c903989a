//! Registry HTTP API (§4.F): register, heartbeat, query endpoints, and the
//! Kubernetes-style operational probes.

mod handlers;
mod metrics;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::store::AgentStore;

pub use metrics::RegistryMetrics;

/// Shared state threaded through every handler, mirroring the teacher's
/// `Relay`/`PolicyClient` style of a small `Arc`-wrapped struct passed as
/// axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AgentStore>,
    pub metrics: Arc<RegistryMetrics>,
}

pub fn router(store: Arc<AgentStore>) -> Router {
    let state = AppState {
        store,
        metrics: Arc::new(RegistryMetrics::new()),
    };

    Router::new()
        .route("/agents/register", post(handlers::register))
        .route("/heartbeat", post(handlers::heartbeat))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/{id}", get(handlers::get_agent))
        .route("/capabilities", get(handlers::capabilities))
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/livez", get(handlers::livez))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
