//! The agent's own HTTP surface (§4.C stage 4, §6): the MCP JSON-RPC
//! endpoint other agents' proxies call into, plus the Kubernetes-style
//! probes `/health`, `/ready`, `/livez`, `/metrics`, `/metadata`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

use crate::builder::ToolHandler;
use crate::resolution::ResolutionSnapshot;

pub struct AgentMetrics {
    registry: Registry,
    pub calls_total: Counter,
    pub calls_failed_total: Counter,
}

impl AgentMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let calls_total = Counter::default();
        let calls_failed_total = Counter::default();
        registry.register("mesh_agent_tool_calls", "Total tools/call invocations", calls_total.clone());
        registry.register(
            "mesh_agent_tool_call_failures",
            "Total tools/call invocations that returned an error",
            calls_failed_total.clone(),
        );
        Self {
            registry,
            calls_total,
            calls_failed_total,
        }
    }

    fn encode(&self) -> String {
        let mut buf = String::new();
        let _ = encode(&mut buf, &self.registry);
        buf
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered tool's descriptor as the HTTP layer needs it: enough to
/// answer `tools/list` and to dispatch `tools/call`.
pub struct MountedTool {
    pub spec: mesh_core::wire::ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

#[derive(Clone)]
pub struct AppState {
    pub agent_id: Arc<str>,
    pub agent_name: Arc<str>,
    pub agent_version: Arc<str>,
    pub tools: Arc<HashMap<String, MountedTool>>,
    pub resolution: Arc<ResolutionSnapshot>,
    pub metrics: Arc<AgentMetrics>,
    pub ready: Arc<AtomicBool>,
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/mcp", post(mcp_rpc))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/livez", get(livez))
        .route("/metrics", get(metrics))
        .route("/metadata", get(metadata))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[serde(default)]
    jsonrpc: Option<String>,
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn ok_envelope(id: Value, result: Value) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn err_envelope(id: Value, code: i64, message: impl Into<String>) -> Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "error": JsonRpcError{code, message: message.into()}})
}

/// Mandatory MCP methods (§6 "MCP wire format"): `tools/list` and
/// `tools/call`.
async fn mcp_rpc(State(state): State<AppState>, Json(req): Json<JsonRpcRequest>) -> Response {
    if req.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return Json(err_envelope(req.id, -32600, "invalid jsonrpc version")).into_response();
    }

    match req.method.as_str() {
        "tools/list" => {
            let tools: Vec<Value> = state
                .tools
                .values()
                .map(|t| {
                    serde_json::json!({
                        "name": t.spec.function_name,
                        "description": t.spec.description,
                        "inputSchema": t.spec.input_schema,
                    })
                })
                .collect();
            Json(ok_envelope(req.id, serde_json::json!({"tools": tools}))).into_response()
        }
        "tools/call" => handle_tools_call(state, req).await,
        other => Json(err_envelope(req.id, -32601, format!("unknown method '{other}'"))).into_response(),
    }
}

async fn handle_tools_call(state: AppState, req: JsonRpcRequest) -> Response {
    let Some(name) = req.params.get("name").and_then(Value::as_str) else {
        return Json(err_envelope(req.id, -32602, "missing params.name")).into_response();
    };
    let arguments = req
        .params
        .get("arguments")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    let Some(tool) = state.tools.get(name) else {
        return Json(err_envelope(req.id, -32601, format!("unknown tool '{name}'"))).into_response();
    };

    state.metrics.calls_total.inc();
    let slots = state.resolution.slots_for(name);
    match tool.handler.call(arguments, &slots).await {
        Ok(value) => {
            let content = serde_json::json!({"content": [{"type": "text", "text": to_text(&value)}]});
            Json(ok_envelope(req.id, content)).into_response()
        }
        Err(e) => {
            state.metrics.calls_failed_total.inc();
            Json(err_envelope(req.id, -32000, e.to_string())).into_response()
        }
    }
}

/// MCP text content blocks carry a string; a handler returning a bare
/// JSON string is passed through, anything else is rendered as JSON text
/// (mirrors the unwrap direction the proxy performs in reverse, §4.A).
fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn livez() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
        .into_response()
}

async fn metadata(State(state): State<AppState>) -> Json<Value> {
    let tools: Vec<Value> = state
        .tools
        .values()
        .map(|t| {
            serde_json::json!({
                "function_name": t.spec.function_name,
                "capability": t.spec.capability,
                "version": t.spec.version,
                "tags": t.spec.tags,
            })
        })
        .collect();
    Json(serde_json::json!({
        "agent_id": state.agent_id.as_ref(),
        "name": state.agent_name.as_ref(),
        "version": state.agent_version.as_ref(),
        "tools": tools,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::error::ToolError;
    use crate::resolution::DependencySlots;

    struct Greet;

    #[async_trait]
    impl ToolHandler for Greet {
        async fn call(&self, args: Value, _deps: &DependencySlots) -> Result<Value, ToolError> {
            let name = args.get("name").and_then(Value::as_str).unwrap_or("world");
            Ok(Value::String(format!("Hello {name}")))
        }
    }

    fn test_state() -> AppState {
        let mut tools = HashMap::new();
        tools.insert(
            "greet".to_string(),
            MountedTool {
                spec: mesh_core::wire::ToolSpec {
                    function_name: "greet".to_string(),
                    capability: "greeting".to_string(),
                    version: "1.0.0".to_string(),
                    tags: vec![],
                    description: Some("greets".to_string()),
                    input_schema: None,
                    dependencies: vec![],
                },
                handler: Arc::new(Greet),
            },
        );
        AppState {
            agent_id: Arc::from("greeter-aaaaaaaa"),
            agent_name: Arc::from("greeter"),
            agent_version: Arc::from("1.0.0"),
            tools: Arc::new(tools),
            resolution: Arc::new(ResolutionSnapshot::empty()),
            metrics: Arc::new(AgentMetrics::new()),
            ready: Arc::new(AtomicBool::new(true)),
        }
    }

    async fn post_json(app: axum::Router, path: &str, body: Value) -> Value {
        let resp = app
            .oneshot(
                Request::post(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn tools_call_dispatches_to_the_registered_handler() {
        let app = router(test_state());
        let resp = post_json(
            app,
            "/mcp",
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"greet","arguments":{"name":"Alice"}}}),
        )
        .await;
        assert_eq!(resp["result"]["content"][0]["text"], "Hello Alice");
    }

    #[tokio::test]
    async fn tools_call_for_unknown_tool_is_a_jsonrpc_error() {
        let app = router(test_state());
        let resp = post_json(
            app,
            "/mcp",
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"nope","arguments":{}}}),
        )
        .await;
        assert!(resp.get("error").is_some());
    }

    #[tokio::test]
    async fn tools_list_returns_mounted_tools() {
        let app = router(test_state());
        let resp = post_json(
            app,
            "/mcp",
            serde_json::json!({"jsonrpc":"2.0","id":1,"method":"tools/list"}),
        )
        .await;
        assert_eq!(resp["result"]["tools"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn probes_and_metadata() {
        let app = router(test_state());
        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/metadata").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
