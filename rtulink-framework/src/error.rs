//! Error types for the process framework.

use thiserror::Error;

/// Result type alias using [`ProcessError`].
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Why an rtulink process could not start or had to stop.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The `--config` path does not exist.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// The configuration is not valid JSON5 for this process, or a value is
    /// out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tracing subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    /// Opening the Zenoh session or declaring on it failed.
    #[error("Address space unavailable: {0}")]
    AddressSpace(String),

    /// A tag or status document could not be encoded.
    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Failed to publish to {key}: {message}")]
    Publish { key: String, message: String },

    #[error("Liveliness token {key}: {message}")]
    Liveliness { key: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// A configuration value rejected by validation.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn liveliness(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Liveliness {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl From<zenoh::Error> for ProcessError {
    fn from(err: zenoh::Error) -> Self {
        Self::AddressSpace(err.to_string())
    }
}

impl From<serde_json::Error> for ProcessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<json5::Error> for ProcessError {
    fn from(err: json5::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<rtulink_common::Error> for ProcessError {
    fn from(err: rtulink_common::Error) -> Self {
        match err {
            rtulink_common::Error::Config(msg) => Self::InvalidConfig(msg),
            rtulink_common::Error::Zenoh(e) => Self::AddressSpace(e.to_string()),
            rtulink_common::Error::Io(e) => Self::Io(e),
            other => Self::Encode(other.to_string()),
        }
    }
}
