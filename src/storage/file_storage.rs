use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::ArtifactStore;

/// Filesystem-backed artifact store.
///
/// Every artifact lives directly under `base_path` as `<uuid><ext>`.
pub struct FileArtifactStore {
    base_path: PathBuf,
}

impl FileArtifactStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create artifact dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed(base_path.display().to_string())
        })?;
        info!("FileArtifactStore initialized at {}", base_path.display());
        Ok(Self { base_path })
    }

    /// Construct a store under `<system temp dir>/darkroom-artifacts`.
    pub fn new_default() -> Result<Self, StorageError> {
        Self::new(std::env::temp_dir().join("darkroom-artifacts"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl ArtifactStore for FileArtifactStore {
    fn allocate(&self, extension: &str) -> PathBuf {
        self.base_path
            .join(format!("{}{}", Uuid::new_v4(), extension))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let mut f = File::create(path).map_err(|e| {
            error!("Failed to create artifact {}: {}", path.display(), e);
            StorageError::WriteFailed(path.display().to_string())
        })?;
        f.write_all(bytes).and_then(|_| f.sync_all()).map_err(|e| {
            error!("Failed to write artifact {}: {}", path.display(), e);
            StorageError::WriteFailed(path.display().to_string())
        })?;
        debug!("Wrote {} byte(s) to {}", bytes.len(), path.display());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let buf = fs::read(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                error!("Read failed {}: {}", path.display(), e);
                StorageError::ReadFailed(path.display().to_string())
            }
        })?;
        debug!("Read {} byte(s) from {}", buf.len(), path.display());
        Ok(buf)
    }

    fn delete(&self, path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed artifact {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Failed to remove artifact {}: {}", path.display(), e);
                Err(StorageError::WriteFailed(path.display().to_string()))
            }
        }
    }
}
