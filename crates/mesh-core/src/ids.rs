//! Agent identifier derivation: `<name>-<8 hex>`, stable for the lifetime of
//! a process (§4.C "Agent ID derivation").

use rand::RngCore;

/// Generate a fresh 8-hex-digit suffix. Agents call this once at startup
/// and cache the result; the registry never generates IDs itself.
pub fn random_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Build an agent id from a name and an existing suffix (used when
/// re-deriving the same id across restarts is undesired — the common case
/// is to call `derive` once).
pub fn with_suffix(name: &str, suffix: &str) -> String {
    format!("{name}-{suffix}")
}

/// Derive a brand new agent id for `name`.
pub fn derive(name: &str) -> String {
    with_suffix(name, &random_suffix())
}

fn rand_bytes(buf: &mut [u8]) {
    rand::rng().fill_bytes(buf);
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
