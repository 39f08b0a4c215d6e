//! rtulink common library
//!
//! Shared types and utilities for the rtulink processes:
//!
//! - [`snapshot`] - The state record written by the serial master
//! - [`exchange`] - Atomic snapshot publication (`SnapshotStore`)
//! - [`health`] - `ComponentHealth`, actors and edge-triggered emission
//! - [`liveness`] - Master/slave health derivation from snapshots
//! - [`tags`] - Address-space tag model
//! - [`keyexpr`] - Key expression builders and parsers
//! - [`serialization`] - JSON/CBOR encoding of tag samples
//! - [`config`] - Zenoh and logging configuration sections
//! - [`session`] - Zenoh session management
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod exchange;
pub mod health;
pub mod keyexpr;
pub mod liveness;
pub mod serialization;
pub mod session;
pub mod snapshot;
pub mod tags;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, ZenohConfig, ZenohMode};
pub use error::{Error, Result};
pub use exchange::{FileSnapshotStore, MemorySnapshotStore, Observation, SnapshotStore, observe};
pub use health::{Actor, ComponentHealth, EdgeTrigger, HealthEmitter};
pub use keyexpr::{DEVICE_OBJECT, KEY_PREFIX, KeyExprBuilder, ParsedTagKey, parse_tag_key};
pub use liveness::{DEFAULT_STALENESS, HealthUpdate, LivenessTracker, SlaveStatus};
pub use serialization::{Format, decode_auto, encode};
pub use session::connect;
pub use snapshot::{Counters, SensorValues, SlaveState, Snapshot, current_epoch_secs};
pub use tags::{Tag, TagSample, TagValue, counter_samples, current_timestamp_millis, sensor_samples};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))
}
