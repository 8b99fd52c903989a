//! The startup pipeline (§4.C): six ordered stages turning an `AgentBuilder`
//! into a running agent. Grounded on the teacher's `registryd` binary
//! wiring (`mcp/registryd/main.rs`) in shape — resolve config, bind a
//! listener, spawn background tasks, return a handle — generalized from a
//! single static binary into a pipeline a library entry point runs once per
//! embedding process.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use mesh_core::ids;
use mesh_core::wire::AgentMetadata;

use crate::builder::AgentBuilder;
use crate::config::AgentConfig;
use crate::error::StartupError;
use crate::heartbeat::HeartbeatPipeline;
use crate::registry_client::RegistryClient;
use crate::resolution::ResolutionSnapshot;
use crate::server::{self, AgentMetrics, AppState, MountedTool};

/// A running agent process. Dropping this does not stop anything — call
/// `shutdown` to cancel the background tasks cleanly (§5 "cancellation at
/// any await is clean").
pub struct AgentHandle {
    pub agent_id: String,
    pub local_addr: Option<SocketAddr>,
    resolution: Arc<ResolutionSnapshot>,
    server_task: Option<tokio::task::JoinHandle<()>>,
    heartbeat_task: Option<tokio::task::JoinHandle<()>>,
}

impl AgentHandle {
    pub fn resolution(&self) -> &Arc<ResolutionSnapshot> {
        &self.resolution
    }

    /// Abort the heartbeat loop and the HTTP server task.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
        if let Some(task) = self.server_task.take() {
            task.abort();
        }
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) async fn run(builder: AgentBuilder) -> Result<AgentHandle, StartupError> {
    // Stage 1: decorator/builder collection. Already done -- `builder.tools`
    // and `builder.mcp_adapter` were assembled by the fluent API.
    let tools_by_name = builder.tools_by_name();

    // Stage 2: configuration resolution (env > builder override > default).
    // The resolved name (env `MCP_MESH_AGENT_NAME` > builder name > default)
    // feeds both the agent id and the advertised metadata, so the two never
    // disagree (§4.C "Agent ID derivation").
    let config = AgentConfig::resolve(&builder.overrides)?;
    let agent_id = ids::derive(&config.agent_name);

    // Stage 3: FastMCP discovery. Optional; a registered adapter that fails
    // to describe itself aborts startup (§9 Design Note).
    if let Some(adapter) = &builder.mcp_adapter {
        let descriptor = adapter
            .describe()
            .map_err(StartupError::DiscoveryFailed)?;
        info!(
            target: "mesh_agent_startup",
            agent_id = %agent_id,
            adapter = %descriptor.name,
            tools = descriptor.tools.len(),
            "mounted foreign mcp server descriptor"
        );
    }

    let resolution = Arc::new(ResolutionSnapshot::empty());
    let metrics = Arc::new(AgentMetrics::new());
    let ready = Arc::new(AtomicBool::new(false));

    let mounted: HashMap<String, MountedTool> = builder
        .tools
        .iter()
        .map(|t| {
            (
                t.function_name.clone(),
                MountedTool {
                    spec: t.to_wire_spec(),
                    handler: tools_by_name
                        .get(&t.function_name)
                        .cloned()
                        .expect("tool handler registered alongside its descriptor"),
                },
            )
        })
        .collect();

    // Stage 4: HTTP server setup.
    let mut local_addr = None;
    let mut server_task = None;
    if config.http_enabled {
        let state = AppState {
            agent_id: Arc::from(agent_id.as_str()),
            agent_name: Arc::from(config.agent_name.as_str()),
            agent_version: Arc::from(builder.version.as_str()),
            tools: Arc::new(mounted),
            resolution: resolution.clone(),
            metrics: metrics.clone(),
            ready: ready.clone(),
        };
        let app = server::router(state);
        let bind_addr: SocketAddr = format!("{}:{}", config.http_host, config.http_port)
            .parse()
            .map_err(|_| StartupError::Bind {
                addr: "0.0.0.0:0".parse().unwrap(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "unparseable bind address"),
            })?;
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .map_err(|source| StartupError::Bind { addr: bind_addr, source })?;
        local_addr = Some(listener.local_addr().map_err(|source| StartupError::Bind {
            addr: bind_addr,
            source,
        })?);
        server_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(target: "mesh_agent_startup", "http server exited: {e}");
            }
        }));
    }

    let tool_specs: Vec<mesh_core::wire::ToolSpec> =
        builder.tools.iter().map(|t| t.to_wire_spec()).collect();
    let metadata = AgentMetadata {
        name: config.agent_name.clone(),
        namespace: config.namespace.clone(),
        endpoint: config.advertised_endpoint(),
        version: builder.version.clone(),
        timeout_threshold: None,
        eviction_threshold: None,
        tools: tool_specs,
    };

    let mut heartbeat_task = None;
    if config.auto_run {
        // Stage 5: registration.
        let registry = RegistryClient::new(config.registry_url.clone());
        let response = registry.register(&agent_id, &metadata).await.map_err(|e| {
            use crate::registry_client::RegistryClientError as E;
            match e {
                E::Unreachable { url, cause } => StartupError::RegistryUnreachable { url, cause },
                E::Rejected { status, body, .. } => {
                    StartupError::RegistryRejected(format!("http {status}: {body}"))
                }
                E::Decode { cause, .. } => StartupError::RegistryRejected(cause),
            }
        })?;
        info!(
            target: "mesh_agent_startup",
            agent_id = %agent_id,
            resource_version = %response.resource_version,
            "registered with mesh registry"
        );

        // Stage 6: heartbeat launch. `MCP_MESH_AUTO_RUN_INTERVAL`, when set,
        // overrides the tick interval; otherwise the pipeline ticks on
        // `health_interval` (§6 "override pipeline tick").
        let pipeline = Arc::new(HeartbeatPipeline::new(
            agent_id.clone(),
            RegistryClient::new(config.registry_url.clone()),
            config.auto_run_interval.unwrap_or(config.health_interval),
            metadata,
            resolution.clone(),
        ));
        apply_initial_resolution(&resolution, response.metadata.dependencies_resolved);
        heartbeat_task = Some(pipeline.spawn());
    }

    ready.store(true, Ordering::Relaxed);

    Ok(AgentHandle {
        agent_id,
        local_addr,
        resolution,
        server_task,
        heartbeat_task,
    })
}

fn apply_initial_resolution(
    resolution: &Arc<ResolutionSnapshot>,
    resolved: mesh_core::wire::DependenciesResolved,
) {
    use crate::proxy::RpcProxy;
    use crate::resolution::{DependencySlots, ResolutionMap};

    let mut map = ResolutionMap::new();
    for (function_name, slots) in resolved {
        let mut proxies = HashMap::new();
        for (slot, resolved_slot) in slots {
            proxies.insert(slot, Arc::new(RpcProxy::new(resolved_slot.primary().clone())));
        }
        map.insert(function_name, Arc::new(DependencySlots::from_proxies(proxies)));
    }
    resolution.swap(map);
}
