use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadAddress(String),
    NotInRange(String),
    UnknownBackend(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadAddress(e) => write!(f, "Address error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::UnknownBackend(e) => write!(f, "Unknown session backend: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures raised by the artifact store and the session store backends.
#[derive(Debug)]
pub enum StorageError {
    /// The target does not exist.
    NotFound(String),
    WriteFailed(String),
    ReadFailed(String),
    /// A persisted session record could not be decoded.
    Corrupted(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(e) => write!(f, "Storage entry not found: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::Corrupted(e) => write!(f, "Storage entry corrupted: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum TransformError {
    /// The input bytes are not a decodable image.
    DecodeFailed(String),
    /// The result could not be encoded in the requested format.
    EncodeFailed(String),
    UnsupportedFormat(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::DecodeFailed(e) => write!(f, "Image decode failed: {}", e),
            TransformError::EncodeFailed(e) => write!(f, "Image encode failed: {}", e),
            TransformError::UnsupportedFormat(e) => write!(f, "Unsupported image format: {}", e),
        }
    }
}

impl std::error::Error for TransformError {}

/// Typed failures surfaced by the session pipeline.
///
/// Every variant is terminal for the current request. When one is returned the
/// session record still fully reflects the artifact that was current before
/// the call.
#[derive(Debug)]
pub enum PipelineError {
    /// The upload was empty, unnamed, in an unsupported format or could not be persisted.
    Ingest(String),
    /// Unknown or expired session id.
    SessionNotFound(String),
    /// The current artifact is missing or unreadable.
    ArtifactUnavailable(String),
    /// Unknown operation or malformed parameter.
    InvalidParameter(String),
    /// Writing the new artifact or the session record failed.
    Persistence(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Ingest(e) => write!(f, "Upload rejected: {}", e),
            PipelineError::SessionNotFound(e) => write!(f, "Session not found: {}", e),
            PipelineError::ArtifactUnavailable(e) => write!(f, "Artifact unavailable: {}", e),
            PipelineError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
            PipelineError::Persistence(e) => write!(f, "Persistence failed: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    Config(ConfigError),
    Storage(StorageError),
    Web(WebError),
    TaskFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Config(e) => write!(f, "Configuration error: {}", e),
            ControllerError::Storage(e) => write!(f, "Storage error: {}", e),
            ControllerError::Web(e) => write!(f, "Web error: {}", e),
            ControllerError::TaskFailed(e) => write!(f, "Background task failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::Config(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::Storage(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::Web(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_display_names_the_failure() {
        let err = PipelineError::InvalidParameter("sigma must be an integer".into());
        assert_eq!(err.to_string(), "Invalid parameter: sigma must be an integer");
    }

    #[test]
    fn controller_error_wraps_config_error() {
        let err: ControllerError = ConfigError::NotInRange("ttl".into()).into();
        assert!(matches!(err, ControllerError::Config(ConfigError::NotInRange(_))));
        assert_eq!(err.to_string(), "Configuration error: Value out of range: ttl");
    }
}
