//! Runtime configuration: TOML file, command-line flags and environment.

pub mod config;
pub mod types;

pub use config::{CliArgs, Config, Overrides};
pub use types::{ServerConfig, SessionBackend, SessionConfig, StorageConfig};
