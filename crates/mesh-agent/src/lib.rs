//! The agent-side runtime: components A (RPC proxy), B (heartbeat
//! pipeline), and C (startup pipeline) of the capability mesh (spec.md §2,
//! §4.A-C).
//!
//! Tool authors interact with this crate through [`AgentBuilder`]: build up
//! an inventory of [`ToolDescriptor`]s, each with its own [`Dependency`]
//! declarations, and call [`AgentBuilder::run`] to perform the six ordered
//! startup stages and hand off to the steady-state heartbeat loop.

pub mod builder;
pub mod compat;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod proxy;
pub mod registry_client;
pub mod resolution;
pub mod server;
pub mod startup;

pub use builder::{AgentBuilder, Dependency, ToolDescriptor, ToolHandler};
pub use compat::{McpServerAdapter, McpServerDescriptor};
pub use error::{ConfigError, StartupError, ToolError};
pub use proxy::{CallError, RpcProxy};
pub use resolution::{DependencySlots, ResolutionMap, ResolutionSnapshot};
pub use startup::AgentHandle;
