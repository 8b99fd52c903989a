use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use mesh_core::wire::{AnyRegisterRequest, HeartbeatRequest, RegistryResponse};

use crate::resolver;
use crate::store::{HealthState, StoreError};

use super::AppState;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<AnyRegisterRequest>,
) -> Response {
    let req = body.into_unified();
    match state.store.upsert_agent(&req.agent_id, &req.metadata).await {
        Ok(version) => {
            state.metrics.registrations_total.inc();
            let snapshot = state.store.snapshot();
            state.metrics.agents_current.set(snapshot.agents.len() as i64);
            let resolved = resolver::resolve_for_agent(&snapshot, &req.agent_id);
            let resp = RegistryResponse::success(&req.agent_id, version, now_rfc3339(), resolved);
            (StatusCode::OK, Json(resp)).into_response()
        }
        Err(e) => {
            let resp = RegistryResponse::error(&req.agent_id, e.to_string());
            (StatusCode::BAD_REQUEST, Json(resp)).into_response()
        }
    }
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Json(body): Json<HeartbeatRequest>,
) -> Response {
    match state.store.touch_heartbeat(&body.agent_id).await {
        Ok(version) => {
            state.metrics.heartbeats_total.inc();
            let snapshot = state.store.snapshot();
            let resolved = resolver::resolve_for_agent(&snapshot, &body.agent_id);
            let resp =
                RegistryResponse::success(&body.agent_id, version, now_rfc3339(), resolved);
            (StatusCode::OK, Json(resp)).into_response()
        }
        Err(StoreError::NotFound(_)) => {
            let resp = RegistryResponse::error(
                &body.agent_id,
                "agent not registered; re-registration required",
            );
            (StatusCode::NOT_FOUND, Json(resp)).into_response()
        }
        Err(e) => {
            let resp = RegistryResponse::error(&body.agent_id, e.to_string());
            (StatusCode::BAD_REQUEST, Json(resp)).into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolView {
    pub function_name: String,
    pub capability: String,
    pub version: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    pub agent_id: String,
    pub name: String,
    pub namespace: Option<String>,
    pub endpoint: String,
    pub version: String,
    pub status: &'static str,
    pub last_heartbeat: u64,
    pub resource_version: u64,
    pub tools: Vec<ToolView>,
}

impl From<&crate::store::AgentRecord> for AgentView {
    fn from(r: &crate::store::AgentRecord) -> Self {
        Self {
            agent_id: r.agent_id.clone(),
            name: r.name.clone(),
            namespace: r.namespace.clone(),
            endpoint: r.endpoint.clone(),
            version: r.version.clone(),
            status: match r.health {
                HealthState::Healthy => "healthy",
                HealthState::Degraded => "degraded",
            },
            last_heartbeat: r.last_heartbeat,
            resource_version: r.resource_version,
            tools: r
                .tools
                .iter()
                .map(|t| ToolView {
                    function_name: t.function_name.clone(),
                    capability: t.capability.clone(),
                    version: t.version_raw.clone(),
                    tags: t.tags.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub capability: Option<String>,
}

pub async fn list_agents(
    State(state): State<AppState>,
    Query(q): Query<ListAgentsQuery>,
) -> Json<Vec<AgentView>> {
    let snapshot = state.store.snapshot();
    let views: Vec<AgentView> = snapshot
        .agents
        .values()
        .filter(|a| q.namespace.as_deref().is_none_or(|ns| a.namespace.as_deref() == Some(ns)))
        .filter(|a| {
            q.status.as_deref().is_none_or(|s| match a.health {
                HealthState::Healthy => s.eq_ignore_ascii_case("healthy"),
                HealthState::Degraded => s.eq_ignore_ascii_case("degraded"),
            })
        })
        .filter(|a| {
            q.capability
                .as_deref()
                .is_none_or(|cap| a.tools.iter().any(|t| t.capability == cap))
        })
        .map(AgentView::from)
        .collect();
    Json(views)
}

pub async fn get_agent(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(record) => Json(AgentView::from(record.as_ref())).into_response(),
        None => (StatusCode::NOT_FOUND, "agent not found").into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct CapabilityProviderView {
    pub agent_id: String,
    pub function_name: String,
    pub version: String,
    pub tags: Vec<String>,
    pub status: &'static str,
}

pub async fn capabilities(
    State(state): State<AppState>,
) -> Json<HashMap<String, Vec<CapabilityProviderView>>> {
    let snapshot = state.store.snapshot();
    let mut out: HashMap<String, Vec<CapabilityProviderView>> = HashMap::new();
    for (capability, providers) in &snapshot.by_capability {
        let mut views = Vec::with_capacity(providers.len());
        for (agent_id, function_name) in providers {
            let Some(agent) = snapshot.agents.get(agent_id) else {
                continue;
            };
            let Some(tool) = agent.tool(function_name) else {
                continue;
            };
            views.push(CapabilityProviderView {
                agent_id: agent_id.clone(),
                function_name: function_name.clone(),
                version: tool.version_raw.clone(),
                tags: tool.tags.clone(),
                status: match agent.health {
                    HealthState::Healthy => "healthy",
                    HealthState::Degraded => "degraded",
                },
            });
        }
        out.insert(capability.clone(), views);
    }
    Json(out)
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready() -> StatusCode {
    StatusCode::OK
}

pub async fn livez() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    state
        .metrics
        .agents_current
        .set(state.store.snapshot().agents.len() as i64);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AgentStore, RegistryConfig};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn register_body(agent_id: &str) -> serde_json::Value {
        serde_json::json!({
            "agent_id": agent_id,
            "metadata": {
                "name": "greeter",
                "endpoint": "http://greeter:8080",
                "version": "1.0.0",
                "tools": [{
                    "function_name": "greet",
                    "capability": "greeting",
                    "version": "1.0.0"
                }]
            }
        })
    }

    #[tokio::test]
    async fn register_then_list_then_get() {
        let store = AgentStore::new(RegistryConfig::default());
        let app = super::super::router(store);

        let resp = app
            .clone()
            .oneshot(
                Request::post("/agents/register")
                    .header("content-type", "application/json")
                    .body(Body::from(register_body("greeter-aaaaaaaa").to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::get("/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                Request::get("/agents/greeter-aaaaaaaa")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_agent_is_404() {
        let store = AgentStore::new(RegistryConfig::default());
        let app = super::super::router(store);
        let resp = app
            .oneshot(
                Request::post("/heartbeat")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"agent_id": "nobody"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn probes_return_200() {
        let store = AgentStore::new(RegistryConfig::default());
        let app = super::super::router(store);
        for path in ["/health", "/ready", "/livez"] {
            let resp = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK, "{path}");
        }
    }
}
