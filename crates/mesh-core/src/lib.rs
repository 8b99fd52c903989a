//! Shared wire contract and small utilities for the capability mesh.
//!
//! `mesh-core` holds only the things the registry and agent sides must agree
//! on byte-for-byte: the JSON shapes exchanged over `/agents/register` and
//! `/heartbeat`, version-constraint matching, and duration parsing. It has
//! no knowledge of HTTP transport or storage — those live in `mesh-registry`
//! and `mesh-agent`.

pub mod duration;
pub mod ids;
pub mod version;
pub mod wire;

pub use version::{VersionError, matches_constraint};
pub use wire::*;
