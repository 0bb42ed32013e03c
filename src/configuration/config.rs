use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::session_management::session_store::ttl_from_secs;
use clap::{Args, Parser};
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Application configuration structure that defines all runtime parameters.
///
/// Every field has a default, so an empty TOML document (or no file at all)
/// yields a working configuration. Values are layered:
/// 1. built-in defaults
/// 2. the TOML file given with `--config` / `DARKROOM_CONFIG`
/// 3. individual command-line flags or their environment variables
///
/// # Examples
///
/// ```
/// use darkroom::configuration::config::Config;
///
/// let config = Config::from_toml_str("[server]\nport = 9000\n").unwrap();
/// assert_eq!(config.server.port, 9000);
/// ```
///
/// # Fields Overview
///
/// - `server`: HTTP bind address, port and upload size limit
/// - `storage`: directories for artifacts and (file backend) session records
/// - `session`: backend choice, TTL, reaper period and transform serialization
#[derive(Debug, PartialEq, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

/// Command line of the `darkroom` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "darkroom")]
#[command(version)]
#[command(about = "Session-scoped image transformation service")]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(long, short, env = "DARKROOM_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Per-field overrides layered on top of the configuration file.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// IP address the HTTP server binds to
    #[arg(long, env = "DARKROOM_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Port the HTTP server listens on
    #[arg(long, env = "DARKROOM_PORT")]
    pub port: Option<u16>,

    /// Directory for transient image artifacts
    #[arg(long, env = "DARKROOM_ARTIFACT_DIR")]
    pub artifact_dir: Option<PathBuf>,

    /// Directory for session records (file backend)
    #[arg(long, env = "DARKROOM_SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// Session store backend
    #[arg(long, env = "DARKROOM_SESSION_BACKEND", value_enum)]
    pub session_backend: Option<SessionBackend>,

    /// Redis host for the redis session backend
    #[arg(long, env = "REDIS_HOST")]
    pub redis_host: Option<String>,

    /// Redis port for the redis session backend
    #[arg(long, env = "REDIS_PORT")]
    pub redis_port: Option<u16>,

    /// Serialize transforms per session
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub serialize_transforms: bool,
}

impl Config {
    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Builds the effective configuration from parsed command-line arguments.
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(&args.overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(addr) = &overrides.bind_address {
            self.server.bind_address = addr.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(dir) = &overrides.artifact_dir {
            self.storage.artifact_dir = dir.clone();
        }
        if let Some(dir) = &overrides.session_dir {
            self.storage.session_dir = dir.clone();
        }
        if let Some(backend) = overrides.session_backend {
            self.session.backend = backend;
        }
        if let Some(host) = &overrides.redis_host {
            self.session.redis_host = host.clone();
        }
        if let Some(port) = overrides.redis_port {
            self.session.redis_port = port;
        }
        if overrides.serialize_transforms {
            self.session.serialize_transforms = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::NotInRange(
                "server.max_upload_bytes must be greater than 0".into(),
            ));
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::NotInRange(
                "session.ttl_secs must be greater than 0".into(),
            ));
        }
        if self.session.backend == SessionBackend::Redis
            && self.session.redis_host.trim().is_empty()
        {
            return Err(ConfigError::NotInRange(
                "session.redis_host must not be empty".into(),
            ));
        }
        if self.session.reaper_interval_secs == 0 {
            return Err(ConfigError::NotInRange(
                "session.reaper_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .trim()
            .parse()
            .map_err(|_| ConfigError::BadAddress(self.server.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.session.ttl_secs)
    }
}
