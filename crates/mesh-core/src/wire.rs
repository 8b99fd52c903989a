//! JSON shapes exchanged between agent and registry (spec.md §6).
//!
//! Field names are snake_case on the wire, matching the Python source this
//! spec was distilled from — there is no camelCase translation layer here
//! the way the teacher's `registry.proto`-derived types use one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `POST /agents/register` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub agent_id: String,
    pub metadata: AgentMetadata,
}

/// The `metadata` object of a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub endpoint: String,
    pub version: String,
    #[serde(default)]
    pub timeout_threshold: Option<u64>,
    #[serde(default)]
    pub eviction_threshold: Option<u64>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
}

/// One exported tool, as advertised by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub function_name: String,
    pub capability: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

/// A dependency declaration attached to a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySpec {
    pub capability: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub kwargs: ProxyKwargs,
    /// Slot name under which the resolution is reported. Defaults to the
    /// capability name for legacy single-capability tools; a typed
    /// `AgentBuilder` declaration supplies the parameter name instead.
    #[serde(default)]
    pub slot: Option<String>,
    /// How many providers to return for this slot (§3 Resolved dependency,
    /// SPEC_FULL §3 supplement on multi-value resolution).
    #[serde(default)]
    pub max_providers: Option<u32>,
}

impl DependencySpec {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            version: None,
            tags: Vec::new(),
            kwargs: ProxyKwargs::default(),
            slot: None,
            max_providers: None,
        }
    }

    pub fn with_version(mut self, constraint: impl Into<String>) -> Self {
        self.version = Some(constraint.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    pub fn with_kwargs(mut self, kwargs: ProxyKwargs) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// The dependency-slot name used as a key in `dependencies_resolved`:
    /// the explicit slot if set, otherwise the capability name (§4.E
    /// "Per-agent output").
    pub fn slot_name(&self) -> &str {
        self.slot.as_deref().unwrap_or(&self.capability)
    }
}

/// RPC proxy configuration (§4.A enumerated table). Every field has the
/// spec's documented default so a bare `{}` on the wire is a fully usable
/// config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyKwargs {
    pub timeout: f64,
    pub retry_count: u32,
    pub retry_delay: f64,
    pub retry_backoff: f64,
    pub custom_headers: HashMap<String, String>,
    pub auth_required: bool,
    pub accepts: Vec<String>,
    pub content_type: String,
    pub max_response_size: u64,
    pub streaming: bool,
    pub stream_timeout: f64,
    pub buffer_size: usize,
    pub session_required: bool,
    pub stateful: bool,
    pub auto_session_management: bool,
}

impl Default for ProxyKwargs {
    fn default() -> Self {
        Self {
            timeout: 30.0,
            retry_count: 1,
            retry_delay: 1.0,
            retry_backoff: 2.0,
            custom_headers: HashMap::new(),
            auth_required: false,
            accepts: vec!["application/json".to_string()],
            content_type: "application/json".to_string(),
            max_response_size: 10 * 1024 * 1024,
            streaming: false,
            stream_timeout: 300.0,
            buffer_size: 4096,
            session_required: false,
            stateful: false,
            auto_session_management: true,
        }
    }
}

/// A single resolved provider for a dependency slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub agent_id: String,
    pub function_name: String,
    pub capability: String,
    pub version: String,
    pub endpoint: String,
    #[serde(default)]
    pub kwargs: ProxyKwargs,
}

/// A resolved slot: the common case is a single provider, serialized as a
/// bare object to match the wire examples in spec.md §6/§8; a multi-provider
/// request (`max_providers > 1`) serializes as an array instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedSlot {
    Single(ResolvedEntry),
    Multiple(Vec<ResolvedEntry>),
}

impl ResolvedSlot {
    /// The top-ranked entry, regardless of representation.
    pub fn primary(&self) -> &ResolvedEntry {
        match self {
            ResolvedSlot::Single(e) => e,
            ResolvedSlot::Multiple(v) => v.first().expect("never constructed empty"),
        }
    }

    pub fn all(&self) -> &[ResolvedEntry] {
        match self {
            ResolvedSlot::Single(e) => std::slice::from_ref(e),
            ResolvedSlot::Multiple(v) => v,
        }
    }

    pub fn from_entries(mut entries: Vec<ResolvedEntry>, multi: bool) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        if multi {
            Some(ResolvedSlot::Multiple(entries))
        } else {
            Some(ResolvedSlot::Single(entries.remove(0)))
        }
    }
}

/// `function_name -> dep_slot -> resolution`.
pub type DependenciesResolved = HashMap<String, HashMap<String, ResolvedSlot>>;

/// The `metadata` object of a register/heartbeat response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionMetadata {
    #[serde(default)]
    pub dependencies_resolved: DependenciesResolved,
}

/// `POST /agents/register` and `POST /heartbeat` share this response
/// shape (§6: "Response mirrors registration's resolution shape").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryResponse {
    pub status: ResponseStatus,
    pub agent_id: String,
    pub resource_version: String,
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
    pub metadata: ResolutionMetadata,
    /// Top-level mirror of `metadata.dependencies_resolved`, kept for
    /// backward compatibility per §6.
    #[serde(default)]
    pub dependencies_resolved: DependenciesResolved,
}

impl RegistryResponse {
    pub fn success(
        agent_id: impl Into<String>,
        resource_version: u64,
        timestamp: impl Into<String>,
        resolved: DependenciesResolved,
    ) -> Self {
        let agent_id = agent_id.into();
        Self {
            status: ResponseStatus::Success,
            agent_id,
            resource_version: resource_version.to_string(),
            timestamp: timestamp.into(),
            message: String::new(),
            metadata: ResolutionMetadata {
                dependencies_resolved: resolved.clone(),
            },
            dependencies_resolved: resolved,
        }
    }

    pub fn error(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            agent_id: agent_id.into(),
            resource_version: "0".to_string(),
            timestamp: String::new(),
            message: message.into(),
            metadata: ResolutionMetadata::default(),
            dependencies_resolved: DependenciesResolved::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `POST /heartbeat` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub agent_id: String,
    #[serde(default)]
    pub health_status: HealthStatus,
}

/// The liveness snapshot an agent attaches to each heartbeat tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

/// Legacy single-capability registration shape (§6/§9 Open Question,
/// decided in SPEC_FULL.md: accepted at the boundary, converted
/// internally). Mirrors exactly one tool per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyRegisterRequest {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub endpoint: String,
    pub function_name: String,
    pub capability: String,
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub timeout_threshold: Option<u64>,
    #[serde(default)]
    pub eviction_threshold: Option<u64>,
}

impl From<LegacyRegisterRequest> for RegisterRequest {
    fn from(legacy: LegacyRegisterRequest) -> Self {
        RegisterRequest {
            agent_id: legacy.agent_id,
            metadata: AgentMetadata {
                name: legacy.name,
                namespace: legacy.namespace,
                endpoint: legacy.endpoint,
                version: legacy.version.clone(),
                timeout_threshold: legacy.timeout_threshold,
                eviction_threshold: legacy.eviction_threshold,
                tools: vec![ToolSpec {
                    function_name: legacy.function_name,
                    capability: legacy.capability,
                    version: legacy.version,
                    tags: legacy.tags,
                    description: legacy.description,
                    input_schema: legacy.input_schema,
                    dependencies: legacy.dependencies,
                }],
            },
        }
    }
}

/// Incoming `/agents/register` body: either shape, disambiguated by the
/// presence of `metadata` vs. top-level `function_name`/`capability`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyRegisterRequest {
    Unified(RegisterRequest),
    Legacy(LegacyRegisterRequest),
}

impl AnyRegisterRequest {
    pub fn into_unified(self) -> RegisterRequest {
        match self {
            AnyRegisterRequest::Unified(r) => r,
            AnyRegisterRequest::Legacy(l) => l.into(),
        }
    }
}
