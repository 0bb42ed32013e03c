use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use tempfile::NamedTempFile;

use crate::error_handling::types::StorageError;
use crate::session_management::session::{SessionId, SessionRecord};
use crate::session_management::session_store::{SessionStore, StoredSession};

const RECORD_EXTENSION: &str = "session.json";

/// Session store keeping one JSON document per session in a directory.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers observe either the previous or the new record.
pub struct FileSessionStore {
    base_path: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    pub fn new<P: AsRef<Path>>(base_path: P, ttl: Duration) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create session dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed(base_path.display().to_string())
        })?;
        info!("FileSessionStore initialized at {}", base_path.display());
        Ok(Self { base_path, ttl })
    }

    fn record_path(&self, id: SessionId) -> PathBuf {
        self.base_path.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    fn read_stored(&self, path: &Path) -> Result<Option<StoredSession>, StorageError> {
        let content = match fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                error!("Failed to read session file {}: {}", path.display(), e);
                return Err(StorageError::ReadFailed(path.display().to_string()));
            }
        };
        serde_json::from_slice(&content).map(Some).map_err(|e| {
            error!("Invalid session file {}: {}", path.display(), e);
            StorageError::Corrupted(path.display().to_string())
        })
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove session file {}: {}", path.display(), e);
                Err(StorageError::WriteFailed(path.display().to_string()))
            }
        }
    }

    fn id_from_path(path: &Path) -> Option<SessionId> {
        let name = path.file_name()?.to_str()?;
        name.strip_suffix(&format!(".{}", RECORD_EXTENSION))?
            .parse()
            .ok()
    }
}

impl SessionStore for FileSessionStore {
    fn set(&self, id: SessionId, record: &SessionRecord) -> Result<(), StorageError> {
        let path = self.record_path(id);
        let stored = StoredSession::new(record.clone(), self.ttl);
        let body = serde_json::to_vec(&stored).map_err(|e| {
            error!("Failed to encode session {}: {}", id, e);
            StorageError::WriteFailed(id.to_string())
        })?;

        let mut tmp = NamedTempFile::new_in(&self.base_path).map_err(|e| {
            error!("Failed to create temp file in {}: {}", self.base_path.display(), e);
            StorageError::WriteFailed(path.display().to_string())
        })?;
        tmp.write_all(&body).map_err(|e| {
            error!("Failed to write session file {}: {}", path.display(), e);
            StorageError::WriteFailed(path.display().to_string())
        })?;
        tmp.persist(&path).map_err(|e| {
            error!("Failed to persist session file {}: {}", path.display(), e);
            StorageError::WriteFailed(path.display().to_string())
        })?;

        debug!("Saved session {} to {}", id, path.display());
        Ok(())
    }

    fn get(&self, id: SessionId) -> Result<Option<SessionRecord>, StorageError> {
        let now = Utc::now();
        Ok(self
            .read_stored(&self.record_path(id))?
            .filter(|s| !s.is_expired(now))
            .map(|s| s.record))
    }

    fn delete(&self, id: SessionId) -> Result<(), StorageError> {
        Self::remove(&self.record_path(id))?;
        debug!("Deleted session {}", id);
        Ok(())
    }

    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SessionId, SessionRecord)>, StorageError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            error!("Failed to read session dir {}: {}", self.base_path.display(), e);
            StorageError::ReadFailed(self.base_path.display().to_string())
        })?;

        let mut expired = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(id) = Self::id_from_path(&path) else {
                continue;
            };
            match self.read_stored(&path) {
                Ok(Some(stored)) if stored.is_expired(now) => {
                    expired.push((path, id, stored.record));
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable session {}: {}", id, e),
            }
        }

        let purged = retire(expired, Self::remove);
        debug!("Purged {} expired session(s)", purged.len());
        Ok(purged)
    }
}

/// Removes the files of expired records. A file that cannot be removed is
/// left for the next sweep; every record that was removed is still returned.
fn retire<F>(
    expired: Vec<(PathBuf, SessionId, SessionRecord)>,
    remove: F,
) -> Vec<(SessionId, SessionRecord)>
where
    F: Fn(&Path) -> Result<(), StorageError>,
{
    expired
        .into_iter()
        .filter_map(|(path, id, record)| match remove(&path) {
            Ok(()) => Some((id, record)),
            Err(e) => {
                warn!("Keeping expired session {} for the next sweep: {}", id, e);
                None
            }
        })
        .collect()
}
