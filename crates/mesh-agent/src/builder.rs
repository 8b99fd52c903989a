//! The explicit builder that replaces the source's import-time decorator
//! registry (§4.C, §9 Design Note "Decorator registry -> explicit
//! registration"): a tool author constructs a `ToolDescriptor` and adds it
//! to an `AgentBuilder`; `AgentBuilder::run` performs the six ordered
//! stages of the startup pipeline (`crate::startup`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use mesh_core::wire::{DependencySpec, ProxyKwargs};

use crate::compat::McpServerAdapter;
use crate::config::ConfigOverrides;
use crate::error::ToolError;
use crate::resolution::DependencySlots;

/// A dependency declaration, built up fluently and turned into a
/// `mesh_core::wire::DependencySpec` by `ToolDescriptor::depends_on`.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub(crate) capability: String,
    pub(crate) version: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) slot: Option<String>,
    pub(crate) max_providers: Option<u32>,
    pub(crate) kwargs: ProxyKwargs,
}

impl Dependency {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            version: None,
            tags: Vec::new(),
            slot: None,
            max_providers: None,
            kwargs: ProxyKwargs::default(),
        }
    }

    pub fn version(mut self, constraint: impl Into<String>) -> Self {
        self.version = Some(constraint.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// The parameter name a typed tool handler reads this dependency from
    /// (§4.E "dep_slot_name is ... its declared parameter name"). Defaults
    /// to the capability name.
    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.slot = Some(name.into());
        self
    }

    pub fn max_providers(mut self, n: u32) -> Self {
        self.max_providers = Some(n);
        self
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.kwargs.timeout = seconds;
        self
    }

    pub fn retry(mut self, count: u32, delay_seconds: f64, backoff: f64) -> Self {
        self.kwargs.retry_count = count;
        self.kwargs.retry_delay = delay_seconds;
        self.kwargs.retry_backoff = backoff;
        self
    }

    pub fn streaming(mut self, stream_timeout_seconds: f64) -> Self {
        self.kwargs.streaming = true;
        self.kwargs.stream_timeout = stream_timeout_seconds;
        self
    }

    pub fn stateful(mut self, session_required: bool) -> Self {
        self.kwargs.stateful = true;
        self.kwargs.session_required = session_required;
        self
    }

    pub fn auth_required(mut self) -> Self {
        self.kwargs.auth_required = true;
        self
    }

    fn into_spec(self) -> DependencySpec {
        let mut spec = DependencySpec::new(self.capability).with_kwargs(self.kwargs);
        if let Some(version) = self.version {
            spec = spec.with_version(version);
        }
        if !self.tags.is_empty() {
            spec = spec.with_tags(self.tags);
        }
        if let Some(slot) = self.slot {
            spec = spec.with_slot(slot);
        }
        spec.max_providers = self.max_providers;
        spec
    }
}

/// A tool's own logic: ordinary code that reads typed arguments and an
/// injected `DependencySlots`, invoking another tool's proxy as if it were
/// a local function (§1 "Purpose", §9 "typed slot binding").
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value, deps: &DependencySlots) -> Result<Value, ToolError>;
}

/// One exported tool: its advertised identity plus the handler invoked on
/// `tools/call`.
pub struct ToolDescriptor {
    pub(crate) function_name: String,
    pub(crate) capability: String,
    pub(crate) version: String,
    pub(crate) tags: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) input_schema: Option<Value>,
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        function_name: impl Into<String>,
        capability: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            capability: capability.into(),
            version: "1.0.0".to_string(),
            tags: Vec::new(),
            description: None,
            input_schema: None,
            dependencies: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub(crate) fn to_wire_spec(&self) -> mesh_core::wire::ToolSpec {
        mesh_core::wire::ToolSpec {
            function_name: self.function_name.clone(),
            capability: self.capability.clone(),
            version: self.version.clone(),
            tags: self.tags.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            dependencies: self
                .dependencies
                .iter()
                .cloned()
                .map(Dependency::into_spec)
                .collect(),
        }
    }
}

/// Builds up the tool inventory and configuration overrides §4.C stage 1
/// would otherwise collect from a process-wide decorator registry, then
/// runs the startup pipeline.
pub struct AgentBuilder {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) version: String,
    pub(crate) overrides: ConfigOverrides,
    pub(crate) tools: Vec<ToolDescriptor>,
    pub(crate) mcp_adapter: Option<Arc<dyn McpServerAdapter>>,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let overrides = ConfigOverrides {
            name: Some(name.clone()),
            ..ConfigOverrides::default()
        };
        Self {
            name,
            namespace: None,
            version: "1.0.0".to_string(),
            overrides,
            tools: Vec::new(),
            mcp_adapter: None,
        }
    }

    pub fn tool(mut self, tool: ToolDescriptor) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn registry_url(mut self, url: impl Into<String>) -> Self {
        self.overrides.registry_url = Some(url.into());
        self
    }

    pub fn http_host(mut self, host: impl Into<String>) -> Self {
        self.overrides.http_host = Some(host.into());
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.overrides.http_port = Some(port);
        self
    }

    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.overrides.health_interval = Some(interval);
        self
    }

    /// Disables registry contact entirely (§4.B "Standalone mode"): the
    /// process still serves tools and answers MCP calls, but all
    /// dependencies remain unbound.
    pub fn standalone(mut self) -> Self {
        self.overrides.standalone = true;
        self
    }

    pub fn mcp_server(mut self, adapter: impl McpServerAdapter + 'static) -> Self {
        self.mcp_adapter = Some(Arc::new(adapter));
        self
    }

    /// Run the six-stage startup pipeline and, if registration succeeds,
    /// launch the heartbeat loop. Returns a handle the embedding process
    /// can use to introspect resolution state or shut down.
    pub async fn run(self) -> Result<crate::startup::AgentHandle, crate::error::StartupError> {
        crate::startup::run(self).await
    }

    pub(crate) fn tools_by_name(&self) -> HashMap<String, Arc<dyn ToolHandler>> {
        self.tools
            .iter()
            .map(|t| (t.function_name.clone(), t.handler.clone()))
            .collect()
    }
}
