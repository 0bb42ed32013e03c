//! Session Store contract
//!
//! The pipeline controller treats the session store as the single source of
//! truth for "what is the current artifact of this session". Implementors must
//! guarantee that:
//! - `set` is atomic from the caller's point of view and refreshes the TTL
//! - `get` never returns a record whose TTL has elapsed
//! - `delete` of an unknown id succeeds

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::StorageError;
use crate::session_management::session::{SessionId, SessionRecord};

/// Default time-to-live of a session record, counted from its last write.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

pub trait SessionStore: Send + Sync {
    /// Upserts `record` under `id` with a refreshed TTL.
    fn set(&self, id: SessionId, record: &SessionRecord) -> Result<(), StorageError>;

    /// Returns the record if it exists and has not expired.
    fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError>;

    /// Removes the record early.
    fn delete(&self, id: SessionId) -> Result<(), StorageError>;

    /// Removes every record expired at `now` and hands them back so the
    /// artifacts they pointed at can be retired.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, SessionRecord)>, StorageError>;
}

/// A record together with its expiry deadline, as kept by the backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn new(record: SessionRecord, ttl: Duration) -> Self {
        Self {
            record,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Converts a TTL in seconds into a chrono duration, capped at a century.
pub fn ttl_from_secs(secs: u64) -> Duration {
    const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;
    Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stored_session_expires_at_deadline() {
        let record = SessionRecord::new("cat.jpg", PathBuf::from("/tmp/a.jpg"));
        let stored = StoredSession::new(record, Duration::seconds(60));
        assert!(!stored.is_expired(Utc::now()));
        assert!(stored.is_expired(stored.expires_at));
        assert!(stored.is_expired(Utc::now() + Duration::seconds(61)));
    }

    #[test]
    fn stored_session_flattens_record_fields() {
        let record = SessionRecord::new("cat.jpg", PathBuf::from("/tmp/a.jpg"));
        let stored = StoredSession::new(record, Duration::seconds(60));
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["originalFilename"], "cat.jpg");
        assert!(json.get("expiresAt").is_some());
    }

    #[test]
    fn ttl_from_secs_matches_default() {
        assert_eq!(ttl_from_secs(DEFAULT_SESSION_TTL_SECS), Duration::minutes(30));
    }
}
