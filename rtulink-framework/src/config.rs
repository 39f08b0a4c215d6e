//! Configuration traits and utilities.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{ProcessError, Result};

/// Trait for process configuration types.
///
/// Implement this trait for a process's configuration struct to get
/// loading, validation, and access to the shared logging section.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use rtulink_framework::{LoggingConfig, ProcessConfig, ProcessError};
///
/// #[derive(Debug, Deserialize)]
/// pub struct HostConfig {
///     pub logging: LoggingConfig,
///     pub host: HostSettings,
/// }
///
/// impl ProcessConfig for HostConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<(), ProcessError> {
///         if self.host.poll_interval_ms == 0 {
///             return Err(ProcessError::validation("poll_interval_ms must be > 0"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ProcessConfig: Sized + DeserializeOwned {
    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse configuration from a JSON5 string and validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ProcessError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}
