//! Agent-side error taxonomy (§7): one enum per concern, `#[from]`
//! conversions for the underlying causes, following the teacher's
//! `mcp/registry/error.rs` pattern.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("binding {addr} failed: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("registry at {url} unreachable: {cause}")]
    RegistryUnreachable { url: String, cause: String },

    #[error("registry rejected registration: {0}")]
    RegistryRejected(String),

    #[error("fastmcp discovery adapter failed to describe itself: {0}")]
    DiscoveryFailed(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised by a tool handler's own body (§7: "Inside RPC proxies,
/// errors propagate to the caller of the injected parameter" — this is the
/// analogous taxonomy for the tool's own logic, surfaced through the MCP
/// `tools/call` JSON-RPC `error` member by the agent's HTTP server).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments for '{function_name}': {message}")]
    InvalidArguments { function_name: String, message: String },
    #[error("tool '{function_name}' failed: {source}")]
    Failed {
        function_name: String,
        #[source]
        source: anyhow::Error,
    },
}
