//! Optional durable backing for `AgentStore` (§4.D "Durable backing
//! (optional): on-disk append log plus periodic snapshot").
//!
//! Follows the teacher's file-source loading idiom
//! (`mcp/registry/client.rs::fetch_from_file`: `fs_err::tokio::read_to_string`
//! + `serde_json::from_str`), used here in the opposite direction: the
//! registry is the writer, and a restarted registry is the reader that
//! replays what it wrote.

mod log;
mod snapshot;

pub use log::{AppendLog, DurableError, LoggedEvent};
pub use snapshot::Snapshot;
