//! Artifact Store Trait
//!
//! This module defines the `ArtifactStore` trait, the interface for the
//! transient image files a session points at.
//!
//! Implementors of this trait are responsible for:
//! - Handing out fresh, collision-free artifact locations
//! - Writing, reading and deleting artifact bytes
//!
//! They know nothing about sessions: deciding when an artifact is no longer
//! referenced belongs to the pipeline controller.

use std::path::{Path, PathBuf};

use crate::error_handling::types::StorageError;

pub trait ArtifactStore: Send + Sync {
    /// Returns a fresh location ending in `extension` (e.g. `.jpg`, or empty).
    ///
    /// Nothing is created on disk until `write` is called.
    fn allocate(&self, extension: &str) -> PathBuf;

    /// Persists `bytes` at `path`, replacing any previous content.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Reads the artifact at `path`. Missing files yield `StorageError::NotFound`.
    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Deletes the artifact at `path`. Deleting a missing path is not an error.
    fn delete(&self, path: &Path) -> Result<(), StorageError>;
}
