use chrono::{DateTime, Duration, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error_handling::types::StorageError;
use crate::session_management::session::{SessionId, SessionRecord};
use crate::session_management::session_store::{SessionStore, StoredSession};

/// In-process session store backed by a mutex-guarded map.
///
/// Expired entries stay in the map until `purge_expired` collects them, but
/// `get` already treats them as absent.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, StoredSession>>,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, StoredSession>>, StorageError> {
        self.sessions
            .lock()
            .map_err(|_| StorageError::ReadFailed("session map lock poisoned".into()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn set(&self, id: SessionId, record: &SessionRecord) -> Result<(), StorageError> {
        let stored = StoredSession::new(record.clone(), self.ttl);
        self.lock()?.insert(id, stored);
        debug!("Stored session {} in memory", id);
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        let now = Utc::now();
        Ok(self
            .lock()?
            .get(&id)
            .filter(|s| !s.is_expired(now))
            .map(|s| s.record.clone()))
    }

    fn delete(&self, id: SessionId) -> Result<(), StorageError> {
        if self.lock()?.remove(&id).is_some() {
            debug!("Deleted session {} from memory", id);
        }
        Ok(())
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, SessionRecord)>, StorageError> {
        let mut sessions = self.lock()?;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        Ok(expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|s| (id, s.record)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(path: &str) -> SessionRecord {
        SessionRecord::new("cat.jpg", PathBuf::from(path))
    }

    #[test]
    fn set_then_get_returns_latest_record() {
        let store = MemorySessionStore::new(Duration::minutes(30));
        let id = SessionId::generate();
        store.set(id, &record("/tmp/a.jpg")).unwrap();
        store.set(id, &record("/tmp/b.jpg")).unwrap();
        let got = store.get(id).unwrap().unwrap();
        assert_eq!(got.artifact_path, PathBuf::from("/tmp/b.jpg"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = MemorySessionStore::new(Duration::minutes(30));
        assert!(store.get(SessionId::generate()).unwrap().is_none());
    }

    #[test]
    fn expired_record_is_hidden_and_purged() {
        let store = MemorySessionStore::new(Duration::zero());
        let id = SessionId::generate();
        store.set(id, &record("/tmp/a.jpg")).unwrap();
        assert!(store.get(id).unwrap().is_none());

        let purged = store.purge_expired(Utc::now()).unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].0, id);
        assert_eq!(purged[0].1.artifact_path, PathBuf::from("/tmp/a.jpg"));
        assert!(store.is_empty());
    }

    #[test]
    fn purge_keeps_live_records() {
        let store = MemorySessionStore::new(Duration::minutes(30));
        let id = SessionId::generate();
        store.set(id, &record("/tmp/a.jpg")).unwrap();
        assert!(store.purge_expired(Utc::now()).unwrap().is_empty());
        assert!(store.get(id).unwrap().is_some());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = MemorySessionStore::new(Duration::minutes(30));
        let id = SessionId::generate();
        store.set(id, &record("/tmp/a.jpg")).unwrap();
        store.delete(id).unwrap();
        store.delete(id).unwrap();
        assert!(store.get(id).unwrap().is_none());
    }
}
