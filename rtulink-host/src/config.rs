//! Configuration for the address-space host.

use std::path::PathBuf;
use std::time::Duration;

use rtulink_common::{Format, KEY_PREFIX, LoggingConfig, ZenohConfig};
use rtulink_framework::{ProcessConfig, ProcessError};
use serde::{Deserialize, Serialize};

/// Complete host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    /// Zenoh session serving the tag tree
    #[serde(default)]
    pub zenoh: ZenohConfig,

    #[serde(default)]
    pub host: HostSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Snapshot watching and tag hosting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    /// Key prefix of the hosted tag tree
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Snapshot written by the serial master
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    /// Time between two snapshot reads in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum snapshot age, in seconds, for the master to count as running
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Payload encoding of published tags
    #[serde(default)]
    pub format: Format,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("datos_modbus.json")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_staleness_secs() -> u64 {
    10
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            snapshot_path: default_snapshot_path(),
            poll_interval_ms: default_poll_interval_ms(),
            staleness_secs: default_staleness_secs(),
            format: Format::default(),
        }
    }
}

impl HostSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

impl ProcessConfig for HostConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> rtulink_framework::Result<()> {
        if self.host.key_prefix.is_empty() {
            return Err(ProcessError::validation("host.key_prefix cannot be empty"));
        }
        if self.host.key_prefix.contains(['*', '$', '?', '#']) {
            return Err(ProcessError::validation(format!(
                "host.key_prefix '{}' must not contain wildcards",
                self.host.key_prefix
            )));
        }
        if self.host.snapshot_path.as_os_str().is_empty() {
            return Err(ProcessError::validation("host.snapshot_path cannot be empty"));
        }
        if self.host.poll_interval_ms == 0 {
            return Err(ProcessError::validation("host.poll_interval_ms must be > 0"));
        }
        if self.host.staleness_secs == 0 {
            return Err(ProcessError::validation("host.staleness_secs must be > 0"));
        }
        Ok(())
    }
}
