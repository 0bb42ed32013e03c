use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use redis::{Client, Commands, Connection};

use crate::error_handling::types::StorageError;
use crate::session_management::session::{SessionId, SessionRecord};
use crate::session_management::session_store::{SessionStore, StoredSession};

/// Prefix of the per-session keys (`session:<id>`).
pub const KEY_PREFIX: &str = "session:";
/// Hash of id -> stored record, kept so the reaper can find the artifacts of
/// records Redis has already expired.
pub const INDEX_KEY: &str = "sessions:index";

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Session store backed by a Redis server.
///
/// Each record lives under `session:<id>` with an `EX` expiry equal to the
/// store TTL, refreshed on every `set`. Lookups therefore never see an
/// expired session, whichever instance wrote it.
pub struct RedisSessionStore {
    client: Client,
    endpoint: String,
    ttl: Duration,
}

pub fn session_key(id: SessionId) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

/// Redis rejects `EX 0`, so sub-second TTLs round up to one second.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.num_seconds().max(1) as u64
}

impl RedisSessionStore {
    /// Creates the client; no connection is made until the first command.
    pub fn new(host: &str, port: u16, ttl: Duration) -> Result<Self, StorageError> {
        let endpoint = format!("{}:{}", host, port);
        let client = Client::open(format!("redis://{}/", endpoint)).map_err(|e| {
            error!("Invalid redis endpoint {}: {}", endpoint, e);
            StorageError::ReadFailed(endpoint.clone())
        })?;
        info!("RedisSessionStore configured for {}", endpoint);
        Ok(Self {
            client,
            endpoint,
            ttl,
        })
    }

    /// Round-trips a `PING` to check the server is reachable.
    pub fn ping(&self) -> Result<(), StorageError> {
        let mut con = self.connection()?;
        redis::cmd("PING").query::<String>(&mut con).map_err(|e| {
            error!("Redis at {} did not answer PING: {}", self.endpoint, e);
            StorageError::ReadFailed(self.endpoint.clone())
        })?;
        Ok(())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn connection(&self) -> Result<Connection, StorageError> {
        self.client
            .get_connection_with_timeout(CONNECT_TIMEOUT)
            .map_err(|e| {
                error!("Unable to reach redis at {}: {}", self.endpoint, e);
                StorageError::ReadFailed(self.endpoint.clone())
            })
    }

    fn decode(id: &str, raw: &str) -> Result<StoredSession, StorageError> {
        serde_json::from_str(raw).map_err(|e| {
            error!("Invalid session record {}: {}", id, e);
            StorageError::Corrupted(id.to_string())
        })
    }
}

impl SessionStore for RedisSessionStore {
    fn set(&self, id: SessionId, record: &SessionRecord) -> Result<(), StorageError> {
        let stored = StoredSession::new(record.clone(), self.ttl);
        let body = serde_json::to_string(&stored).map_err(|e| {
            error!("Failed to encode session {}: {}", id, e);
            StorageError::WriteFailed(id.to_string())
        })?;

        let mut con = self
            .connection()
            .map_err(|_| StorageError::WriteFailed(self.endpoint.clone()))?;
        redis::pipe()
            .atomic()
            .set_ex(session_key(id), &body, expiry_secs(self.ttl))
            .ignore()
            .hset(INDEX_KEY, id.to_string(), &body)
            .ignore()
            .query::<()>(&mut con)
            .map_err(|e| {
                error!("Failed to store session {}: {}", id, e);
                StorageError::WriteFailed(id.to_string())
            })?;

        debug!("Saved session {} to redis", id);
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        let mut con = self.connection()?;
        let raw: Option<String> = con.get(session_key(id)).map_err(|e| {
            error!("Failed to read session {}: {}", id, e);
            StorageError::ReadFailed(id.to_string())
        })?;

        let now = Utc::now();
        match raw {
            Some(raw) => Ok(Some(Self::decode(&id.to_string(), &raw)?)
                .filter(|s| !s.is_expired(now))
                .map(|s| s.record)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: SessionId) -> Result<(), StorageError> {
        let mut con = self
            .connection()
            .map_err(|_| StorageError::WriteFailed(self.endpoint.clone()))?;
        redis::pipe()
            .atomic()
            .del(session_key(id))
            .ignore()
            .hdel(INDEX_KEY, id.to_string())
            .ignore()
            .query::<()>(&mut con)
            .map_err(|e| {
                error!("Failed to delete session {}: {}", id, e);
                StorageError::WriteFailed(id.to_string())
            })?;
        debug!("Deleted session {}", id);
        Ok(())
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, SessionRecord)>, StorageError> {
        let mut con = self.connection()?;
        let index: HashMap<String, String> = con.hgetall(INDEX_KEY).map_err(|e| {
            error!("Failed to read session index: {}", e);
            StorageError::ReadFailed(INDEX_KEY.to_string())
        })?;

        let mut purged = Vec::new();
        for (field, raw) in index {
            let Ok(id) = field.parse::<SessionId>() else {
                warn!("Skipping foreign index entry '{}'", field);
                continue;
            };
            let stored = match Self::decode(&field, &raw) {
                Ok(stored) => stored,
                Err(e) => {
                    warn!("Skipping unreadable session {}: {}", id, e);
                    continue;
                }
            };
            if !stored.is_expired(now) {
                continue;
            }
            let removed = redis::pipe()
                .atomic()
                .del(session_key(id))
                .ignore()
                .hdel(INDEX_KEY, &field)
                .ignore()
                .query::<()>(&mut con);
            match removed {
                Ok(()) => purged.push((id, stored.record)),
                Err(e) => warn!("Keeping expired session {} for the next sweep: {}", id, e),
            }
        }
        debug!("Purged {} expired session(s)", purged.len());
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;

    fn local_store(ttl: Duration) -> Option<RedisSessionStore> {
        let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379);
        let store = RedisSessionStore::new(&host, port, ttl).ok()?;
        store.ping().ok()?;
        Some(store)
    }

    #[test]
    fn test_keys_use_session_prefix() {
        let id = SessionId::generate();
        assert_eq!(session_key(id), format!("session:{}", id));
    }

    #[test]
    fn test_expiry_is_at_least_one_second() {
        assert_eq!(expiry_secs(Duration::minutes(30)), 1800);
        assert_eq!(expiry_secs(Duration::zero()), 1);
    }

    #[test]
    fn test_unreachable_server_is_a_storage_error() {
        let store = RedisSessionStore::new("127.0.0.1", 1, Duration::minutes(30)).unwrap();
        assert_eq!(store.endpoint(), "127.0.0.1:1");
        let id = SessionId::generate();
        let record = SessionRecord::new("cat.jpg", PathBuf::from("/tmp/a.jpg"));

        assert!(matches!(
            store.set(id, &record),
            Err(StorageError::WriteFailed(_))
        ));
        assert!(matches!(store.get(id), Err(StorageError::ReadFailed(_))));
        assert!(store.purge_expired(Utc::now()).is_err());
        assert!(store.ping().is_err());
    }

    #[test]
    #[serial]
    fn test_round_trip_against_live_server() {
        let Some(store) = local_store(Duration::minutes(30)) else {
            eprintln!("Skipping test: no redis server reachable");
            return;
        };
        let id = SessionId::generate();
        store
            .set(id, &SessionRecord::new("cat.jpg", PathBuf::from("/tmp/a.jpg")))
            .unwrap();
        assert_eq!(
            store.get(id).unwrap().unwrap().artifact_path,
            PathBuf::from("/tmp/a.jpg")
        );

        let purged = store.purge_expired(Utc::now() + Duration::hours(1)).unwrap();
        assert!(purged.iter().any(|(purged_id, _)| *purged_id == id));
        assert!(store.get(id).unwrap().is_none());
        store.delete(id).unwrap();
    }
}
