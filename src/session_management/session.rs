use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Opaque handle identifying one client's editing sequence.
///
/// Wraps a v4 UUID so session ids cannot be mixed up with artifact paths or
/// operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(SessionId)
    }
}

/// Server-side state of a session, as persisted in the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Name supplied at upload; only its extension is ever used.
    pub original_filename: String,
    /// The artifact currently considered "current" for the session.
    pub artifact_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(original_filename: impl Into<String>, artifact_path: PathBuf) -> Self {
        Self {
            original_filename: original_filename.into(),
            artifact_path,
            created_at: Utc::now(),
        }
    }

    /// Extension of the original upload including the leading dot, or an empty string.
    pub fn extension(&self) -> String {
        extension_of(&self.original_filename)
    }

    /// Same record pointing at a different artifact.
    pub fn with_artifact(&self, artifact_path: PathBuf) -> Self {
        Self {
            artifact_path,
            ..self.clone()
        }
    }
}

/// Returns `.ext` for `name.ext`, or an empty string when there is no extension.
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}
