//! Session-bound call state (§4.A state machine: `fresh -> session_created
//! -> calling -> idle -> closed`). Mirrors the teacher's `MemoryStore`
//! (`stateful/memory.rs`): a `Mutex`-guarded map with lazy TTL expiry
//! checked on read, since server-side TTL governs real cleanup and the
//! local copy only needs to avoid reusing an entry past its own idea of
//! freshness.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct SessionEntry {
    session_id: String,
    expires_at: Instant,
}

/// Tracks at most one active session per proxy instance, as the public
/// contract implies (`call_with_session` reuses *the* session id, not one
/// of several).
pub struct SessionStore {
    ttl: Duration,
    current: Mutex<Option<SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: Mutex::new(None),
        }
    }

    /// The live session id, if one exists and hasn't locally expired.
    pub fn current(&self) -> Option<String> {
        let mut guard = self.current.lock().unwrap();
        match guard.as_ref() {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.session_id.clone()),
            Some(_) => {
                *guard = None;
                None
            }
            None => None,
        }
    }

    /// Install a newly created or explicitly supplied session id,
    /// refreshing its local TTL.
    pub fn set(&self, session_id: String) {
        *self.current.lock().unwrap() = Some(SessionEntry {
            session_id,
            expires_at: Instant::now() + self.ttl,
        });
    }

    pub fn clear(&self) {
        *self.current.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_store_has_no_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(store.current().is_none());
    }

    #[test]
    fn set_then_current_round_trips() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.set("sess-1".to_string());
        assert_eq!(store.current(), Some("sess-1".to_string()));
    }

    #[test]
    fn expired_session_reads_as_absent() {
        let store = SessionStore::new(Duration::from_millis(1));
        store.set("sess-1".to_string());
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.current().is_none());
    }

    #[test]
    fn clear_drops_the_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        store.set("sess-1".to_string());
        store.clear();
        assert!(store.current().is_none());
    }
}
