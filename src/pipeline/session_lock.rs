use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session_management::session::SessionId;

/// Per-session mutual exclusion for the read-transform-write-update sequence.
///
/// Each session id maps to its own mutex, so transforms on different sessions
/// never wait on each other.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `id`, creating it on first use.
    pub fn handle(&self, id: SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }

    /// Drops the mutex of a session that no longer exists.
    pub fn forget(&self, id: SessionId) {
        self.locks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
