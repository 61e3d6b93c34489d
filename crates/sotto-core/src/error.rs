use thiserror::Error;

/// Top-level error type for the Sotto system.
///
/// Each variant wraps a subsystem-specific failure. Subsystem crates define
/// their own error types and implement `From<SubsystemError> for SottoError`
/// so that the `?` operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SottoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Insertion error: {0}")]
    Insertion(String),

    #[error("Correction store error: {0}")]
    Correction(String),

    #[error("Trigger error: {0}")]
    Trigger(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for SottoError {
    fn from(err: toml::de::Error) -> Self {
        SottoError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SottoError {
    fn from(err: toml::ser::Error) -> Self {
        SottoError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SottoError {
    fn from(err: serde_json::Error) -> Self {
        SottoError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Sotto operations.
pub type Result<T> = std::result::Result<T, SottoError>;
