//! FastMCP discovery shim (§4.C stage 3, §9 Design Note): a narrow trait an
//! embedding application implements when it also hosts a framework-native
//! MCP server object that should be mounted alongside the mesh's own HTTP
//! surface. Optional to register; a registered one that fails to describe
//! itself aborts startup rather than being silently skipped (§9).

/// One prompt or resource exposed by a foreign MCP server implementation.
#[derive(Debug, Clone)]
pub struct McpServerDescriptor {
    pub name: String,
    pub tools: Vec<String>,
    pub prompts: Vec<String>,
    pub resources: Vec<String>,
}

/// Implemented by an embedding application's own MCP server object so the
/// startup pipeline can mount it without the mesh runtime needing to know
/// its concrete type.
pub trait McpServerAdapter: Send + Sync {
    fn describe(&self) -> Result<McpServerDescriptor, String>;
}
