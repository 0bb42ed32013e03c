use serde::Deserialize;
use std::path::PathBuf;

use crate::session_management::session_store::DEFAULT_SESSION_TTL_SECS;

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Default cap on uploaded image size (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 8080,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the transient image artifacts.
    pub artifact_dir: PathBuf,
    /// Directory holding session records when the file backend is selected.
    pub session_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            artifact_dir: tmp.join("darkroom-artifacts"),
            session_dir: tmp.join("darkroom-sessions"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    File,
    Redis,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    /// Lifetime of a session record, refreshed on every write.
    pub ttl_secs: u64,
    /// Period of the sweep retiring expired sessions and their artifacts.
    pub reaper_interval_secs: u64,
    /// Hold a per-session lock across each transform.
    pub serialize_transforms: bool,
    /// Redis endpoint used by the `redis` backend.
    pub redis_host: String,
    pub redis_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            reaper_interval_secs: 60,
            serialize_transforms: false,
            redis_host: String::from(DEFAULT_REDIS_HOST),
            redis_port: DEFAULT_REDIS_PORT,
        }
    }
}
