//! Error types for the MQTT side of rtulink.

use thiserror::Error;

/// Errors raised by broker setup, publishing and address-space access.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Failed to read CA certificate '{path}': {source}")]
    CaCertificate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid QoS level {0} (use 0, 1 or 2)")]
    InvalidQos(u8),

    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("Address space host not reachable at '{0}'")]
    HostUnreachable(String),

    #[error("Browse failed: {0}")]
    Browse(String),
}

impl MqttError {
    /// Whether the error concerns the address-space host rather than the broker.
    pub fn is_host_failure(&self) -> bool {
        matches!(self, MqttError::HostUnreachable(_) | MqttError::Browse(_))
    }
}

/// Result type for the MQTT crate.
pub type Result<T> = std::result::Result<T, MqttError>;
