//! Configuration for the serial master.

use std::path::PathBuf;
use std::time::Duration;

use rtulink_common::{LoggingConfig, SensorValues};
use rtulink_framework::{ProcessConfig, ProcessError};
use rtulink_mqtt::MqttConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for ProcessError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(msg) => ProcessError::validation(msg),
        }
    }
}

/// Complete master configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Serial line and slave addressing
    #[serde(default)]
    pub serial: SerialConfig,

    /// Poll loop cadence and snapshot output
    #[serde(default)]
    pub master: PollConfig,

    /// Write command mapping and queueing
    #[serde(default)]
    pub commands: CommandConfig,

    /// Broker for command intake; intake is disabled when absent
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial line settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM7")
    #[serde(default = "default_port")]
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "none")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Per-transaction response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Modbus slave ID (1-247)
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// First holding register of the sensor map
    #[serde(default)]
    pub start_address: u16,
    /// Registers read per poll; the sensor map is fixed at 4
    #[serde(default = "default_register_count")]
    pub register_count: u16,
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_slave_id() -> u8 {
    1
}

fn default_register_count() -> u16 {
    SensorValues::REGISTER_COUNT
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            timeout_ms: default_timeout_ms(),
            slave_id: default_slave_id(),
            start_address: 0,
            register_count: default_register_count(),
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay before reopening the port after a transport failure
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Snapshot file shared with the address-space host
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("datos_modbus.json")
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl PollConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Write command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Coil driven by digital commands
    #[serde(default)]
    pub coil_address: u16,
    /// Holding register driven by analog commands
    #[serde(default = "default_analog_register")]
    pub analog_register: u16,
    /// Commands buffered between poll cycles
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_analog_register() -> u16 {
    4
}

fn default_queue_capacity() -> usize {
    16
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            coil_address: 0,
            analog_register: default_analog_register(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl MasterConfig {
    /// Validate the configuration.
    pub fn check(&self) -> Result<(), ConfigError> {
        let serial = &self.serial;

        if serial.port.is_empty() {
            return Err(ConfigError::Validation(
                "Serial port cannot be empty".to_string(),
            ));
        }

        if serial.slave_id == 0 || serial.slave_id > 247 {
            return Err(ConfigError::Validation(format!(
                "slave_id must be 1-247, got {}",
                serial.slave_id
            )));
        }

        if serial.register_count != SensorValues::REGISTER_COUNT {
            return Err(ConfigError::Validation(format!(
                "register_count must be {} (fixed sensor map), got {}",
                SensorValues::REGISTER_COUNT,
                serial.register_count
            )));
        }

        match serial.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "invalid parity '{}' (use none, even, or odd)",
                    serial.parity
                )));
            }
        }

        if !(5..=8).contains(&serial.data_bits) {
            return Err(ConfigError::Validation(format!(
                "data_bits must be 5-8, got {}",
                serial.data_bits
            )));
        }

        if !matches!(serial.stop_bits, 1 | 2) {
            return Err(ConfigError::Validation(format!(
                "stop_bits must be 1 or 2, got {}",
                serial.stop_bits
            )));
        }

        if serial.timeout_ms == 0
            || self.master.poll_interval_ms == 0
            || self.master.reconnect_delay_ms == 0
        {
            return Err(ConfigError::Validation(
                "timeout_ms, poll_interval_ms and reconnect_delay_ms must be > 0".to_string(),
            ));
        }

        if serial.timeout_ms >= self.master.poll_interval_ms {
            return Err(ConfigError::Validation(format!(
                "timeout_ms ({}) must be shorter than poll_interval_ms ({})",
                serial.timeout_ms, self.master.poll_interval_ms
            )));
        }

        let sensor_map = serial.start_address..serial.start_address.saturating_add(serial.register_count);
        if sensor_map.contains(&self.commands.analog_register) {
            return Err(ConfigError::Validation(format!(
                "analog_register {} overlaps the sensor registers {}..{}",
                self.commands.analog_register, sensor_map.start, sensor_map.end
            )));
        }

        if self.commands.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "queue_capacity must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ProcessConfig for MasterConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> rtulink_framework::Result<()> {
        Ok(self.check()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_deployment_defaults() {
        let config = MasterConfig::parse("{}").unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.serial.stop_bits, 1);
        assert_eq!(config.serial.timeout(), Duration::from_secs(1));
        assert_eq!(config.serial.slave_id, 1);
        assert_eq!(config.serial.start_address, 0);
        assert_eq!(config.serial.register_count, 4);
        assert_eq!(config.master.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.master.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.master.snapshot_path, PathBuf::from("datos_modbus.json"));
        assert_eq!(config.commands.coil_address, 0);
        assert_eq!(config.commands.analog_register, 4);
        assert_eq!(config.commands.queue_capacity, 16);
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            serial: {
                port: "COM7",
                baud_rate: 19200,
                parity: "even",
                slave_id: 5,
                timeout_ms: 300,
            },
            master: { poll_interval_ms: 500, snapshot_path: "/run/rtulink/datos_modbus.json" },
            commands: { coil_address: 2, analog_register: 10 },
            mqtt: { broker: "broker.local", port: 1883, topic_base: "lab" },
            logging: { level: "debug", format: "json" },
        }"#;

        let config = MasterConfig::parse(json).unwrap();
        assert_eq!(config.serial.port, "COM7");
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.serial.slave_id, 5);
        assert_eq!(config.serial.timeout(), Duration::from_millis(300));
        assert_eq!(config.master.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.commands.coil_address, 2);
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.broker, "broker.local");
        assert_eq!(mqtt.topic_base, "lab");
    }

    #[test]
    fn test_validate_slave_id() {
        let result = MasterConfig::parse("{ serial: { slave_id: 0 } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_register_count() {
        let result = MasterConfig::parse("{ serial: { register_count: 6 } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_parity() {
        let result = MasterConfig::parse("{ serial: { parity: \"mark\" } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_zero_interval() {
        let result = MasterConfig::parse("{ master: { poll_interval_ms: 0 } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_timeout_shorter_than_interval() {
        // The 1000 ms default timeout does not fit a 500 ms cadence.
        let result = MasterConfig::parse("{ master: { poll_interval_ms: 500 } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));

        let equal = MasterConfig::parse("{ serial: { timeout_ms: 2000 } }");
        assert!(matches!(equal, Err(ProcessError::InvalidConfig(_))));

        let fits = MasterConfig::parse(
            "{ serial: { timeout_ms: 400 }, master: { poll_interval_ms: 500 } }",
        );
        assert!(fits.is_ok());
    }

    #[test]
    fn test_validate_analog_register_collision() {
        let result = MasterConfig::parse("{ commands: { analog_register: 2 } }");
        assert!(matches!(result, Err(ProcessError::InvalidConfig(_))));

        let moved = MasterConfig::parse("{ serial: { start_address: 10 }, commands: { analog_register: 2 } }");
        assert!(moved.is_ok());
    }
}
