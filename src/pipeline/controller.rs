use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::types::{PipelineError, StorageError, TransformError};
use crate::imaging::operation::{Operation, Parameters};
use crate::imaging::transform::ImageTransform;
use crate::pipeline::session_lock::SessionLocks;
use crate::session_management::session::{extension_of, SessionId, SessionRecord};
use crate::session_management::session_store::SessionStore;
use crate::storage::storage_trait::ArtifactStore;

/// Result of a successful `apply_transform`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutcome {
    pub session_id: SessionId,
    /// The artifact that is now current for the session.
    pub artifact_path: PathBuf,
    pub operation: String,
    pub parameters: Parameters,
    /// Superseded artifact that could not be deleted, if any.
    #[serde(skip)]
    pub stale_artifact: Option<PathBuf>,
}

/// Outcome of one sweep over expired sessions.
#[derive(Debug, Default)]
pub struct ReapReport {
    pub expired: usize,
    /// Artifacts of expired sessions that could not be deleted.
    pub undeleted: Vec<PathBuf>,
}

/// Orchestrates the session/artifact lifecycle.
///
/// The session store is the single source of truth for the current artifact
/// of a session; nothing is cached between calls. An artifact is only deleted
/// once no session record points at it any more:
/// - after a successful record update, the superseded artifact is deleted
/// - after a failed record update, the freshly written artifact is deleted
///
/// Without [`with_serialized_transforms`](Self::with_serialized_transforms),
/// concurrent transforms on the same session race: the last record update
/// wins and the loser's artifact is left unreferenced.
pub struct PipelineController {
    sessions: Arc<dyn SessionStore>,
    artifacts: Arc<dyn ArtifactStore>,
    transform: Arc<dyn ImageTransform>,
    locks: Option<SessionLocks>,
}

impl PipelineController {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        artifacts: Arc<dyn ArtifactStore>,
        transform: Arc<dyn ImageTransform>,
    ) -> Self {
        Self {
            sessions,
            artifacts,
            transform,
            locks: None,
        }
    }

    /// Holds a per-session lock for the whole of every mutating operation.
    pub fn with_serialized_transforms(mut self) -> Self {
        self.locks = Some(SessionLocks::new());
        self
    }

    pub fn serializes_transforms(&self) -> bool {
        self.locks.is_some()
    }

    /// Number of sessions currently holding an entry in the lock registry.
    pub fn lock_entries(&self) -> usize {
        self.locks.as_ref().map_or(0, SessionLocks::len)
    }

    /// Stores an uploaded image and opens a session on it.
    ///
    /// Either both the artifact and the session record exist afterwards, or
    /// neither does.
    pub fn begin_session(
        &self,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<SessionId, PipelineError> {
        let filename = original_filename.trim();
        if bytes.is_empty() {
            return Err(PipelineError::Ingest("upload is empty".to_string()));
        }
        if filename.is_empty() {
            return Err(PipelineError::Ingest("upload has no filename".to_string()));
        }
        let extension = extension_of(filename);
        if !self.transform.supports(&extension) {
            return Err(PipelineError::Ingest(format!(
                "unsupported file type '{}'",
                filename
            )));
        }

        let id = SessionId::generate();
        let path = self.artifacts.allocate(&extension);
        if let Err(e) = self.artifacts.write(&path, bytes) {
            return Err(PipelineError::Ingest(self.discard(&path, e.to_string())));
        }

        let record = SessionRecord::new(filename, path.clone());
        if let Err(e) = self.sessions.set(id, &record) {
            return Err(PipelineError::Persistence(self.discard(&path, e.to_string())));
        }
        Ok(id)
    }

    /// Applies `operation_name` to the session's current artifact and makes
    /// the result current.
    ///
    /// Parameters are validated before any artifact is read or written. On
    /// any error the session still points at its previous artifact.
    pub fn apply_transform(
        &self,
        id: SessionId,
        operation_name: &str,
        parameters: Parameters,
    ) -> Result<TransformOutcome, PipelineError> {
        let lock = self.lock_handle(id)?;
        let _guard = lock.as_deref().map(Self::acquire);

        let record = self.lookup_locked(id)?;
        let operation = Operation::parse(operation_name, &parameters)?;

        let input = self
            .artifacts
            .read(&record.artifact_path)
            .map_err(|e| PipelineError::ArtifactUnavailable(e.to_string()))?;

        let extension = record.extension();
        let output = self
            .transform
            .apply(&input, &extension, &operation)
            .map_err(|e| match e {
                TransformError::DecodeFailed(_) => {
                    PipelineError::ArtifactUnavailable(e.to_string())
                }
                _ => PipelineError::Persistence(e.to_string()),
            })?;

        let new_path = self.artifacts.allocate(&extension);
        if let Err(e) = self.artifacts.write(&new_path, &output) {
            return Err(PipelineError::Persistence(self.discard(&new_path, e.to_string())));
        }

        let updated = record.with_artifact(new_path.clone());
        if let Err(e) = self.sessions.set(id, &updated) {
            return Err(PipelineError::Persistence(self.discard(&new_path, e.to_string())));
        }

        let old_path = record.artifact_path;
        let stale_artifact = if old_path != new_path {
            self.artifacts.delete(&old_path).err().map(|_| old_path)
        } else {
            None
        };

        Ok(TransformOutcome {
            session_id: id,
            artifact_path: new_path,
            operation: operation.name().to_string(),
            parameters: Operation::recognised(parameters),
            stale_artifact,
        })
    }

    /// Returns the current artifact of a session and its bytes.
    pub fn current_artifact(&self, id: SessionId) -> Result<(PathBuf, Vec<u8>), PipelineError> {
        let record = self.lookup(id)?;
        let bytes = self
            .artifacts
            .read(&record.artifact_path)
            .map_err(|e| PipelineError::ArtifactUnavailable(e.to_string()))?;
        Ok((record.artifact_path, bytes))
    }

    /// Tears a session down: the record goes first, then its artifact.
    ///
    /// Once the record is gone the session is over, so an artifact that
    /// cannot be deleted does not fail the call; its path is returned instead.
    pub fn end_session(&self, id: SessionId) -> Result<Option<PathBuf>, PipelineError> {
        let stale_artifact = {
            let lock = self.lock_handle(id)?;
            let _guard = lock.as_deref().map(Self::acquire);

            let record = self.lookup_locked(id)?;
            self.sessions
                .delete(id)
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
            self.artifacts
                .delete(&record.artifact_path)
                .err()
                .map(|_| record.artifact_path)
        };
        if let Some(locks) = &self.locks {
            locks.forget(id);
        }
        Ok(stale_artifact)
    }

    /// Retires every session whose TTL has elapsed at `now`, deleting the
    /// artifacts they pointed at.
    pub fn reap_expired(&self, now: DateTime<Utc>) -> Result<ReapReport, StorageError> {
        let mut report = ReapReport::default();
        for (id, record) in self.sessions.purge_expired(now)? {
            report.expired += 1;
            if self.artifacts.delete(&record.artifact_path).is_err() {
                report.undeleted.push(record.artifact_path);
            }
            if let Some(locks) = &self.locks {
                locks.forget(id);
            }
        }
        Ok(report)
    }

    fn lookup(&self, id: SessionId) -> Result<SessionRecord, PipelineError> {
        self.sessions
            .get(id)
            .map_err(|e| PipelineError::Persistence(e.to_string()))?
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))
    }

    /// Returns the session's mutex when transforms are serialized. Ids
    /// without a live record never get an entry in the lock registry.
    fn lock_handle(&self, id: SessionId) -> Result<Option<Arc<Mutex<()>>>, PipelineError> {
        match &self.locks {
            Some(locks) => {
                self.lookup(id)?;
                Ok(Some(locks.handle(id)))
            }
            None => Ok(None),
        }
    }

    /// Re-reads the record under the session lock; drops the lock entry if
    /// the session vanished in between.
    fn lookup_locked(&self, id: SessionId) -> Result<SessionRecord, PipelineError> {
        let result = self.lookup(id);
        if let (Err(PipelineError::SessionNotFound(_)), Some(locks)) = (&result, &self.locks) {
            locks.forget(id);
        }
        result
    }

    fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        lock.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Deletes an artifact no record points at and folds a cleanup failure
    /// into the error message.
    fn discard(&self, path: &Path, cause: String) -> String {
        match self.artifacts.delete(path) {
            Ok(()) => cause,
            Err(e) => format!("{}; cleanup of {} also failed: {}", cause, path.display(), e),
        }
    }
}
