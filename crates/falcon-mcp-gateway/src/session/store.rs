//! Session store used by the stateful session manager

use std::sync::Arc;

use dashmap::DashMap;

use super::types::{SessionEntry, SessionId};

/// Storage for stateful sessions
///
/// Implementations must be safe to call from many request tasks at once.
pub trait SessionStore: Send + Sync {
    /// Insert `entry` unless a session with the same id already exists.
    /// Returns whichever entry is stored afterwards.
    fn insert(&self, entry: Arc<SessionEntry>) -> Arc<SessionEntry>;

    fn lookup(&self, id: &str) -> Option<Arc<SessionEntry>>;

    /// Remove exactly this entry. Returns false if it was already gone or
    /// replaced by another session with the same id.
    fn evict(&self, entry: &SessionEntry) -> bool;

    fn ids(&self) -> Vec<SessionId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store backed by a concurrent map
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, entry: Arc<SessionEntry>) -> Arc<SessionEntry> {
        self.sessions
            .entry(entry.id().clone())
            .or_insert(entry)
            .value()
            .clone()
    }

    fn lookup(&self, id: &str) -> Option<Arc<SessionEntry>> {
        let id = SessionId::parse(id)?;
        self.sessions.get(&id).map(|e| e.value().clone())
    }

    fn evict(&self, entry: &SessionEntry) -> bool {
        self.sessions
            .remove_if(entry.id(), |_, stored| std::ptr::eq(Arc::as_ptr(stored), entry))
            .is_some()
    }

    fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
