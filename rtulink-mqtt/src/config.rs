//! Broker and bridge configuration.
//!
//! [`MqttConfig`] is shared with the serial master, which uses the same
//! broker for command intake.

use std::path::PathBuf;
use std::time::Duration;

use rtulink_common::{KEY_PREFIX, LoggingConfig, ZenohConfig};
use rtulink_framework::{ProcessConfig, ProcessError};
use rumqttc::QoS;
use serde::{Deserialize, Serialize};

use crate::error::MqttError;

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name
    #[serde(default = "default_broker")]
    pub broker: String,
    /// Broker port (default: 8883, MQTT over TLS)
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// CA certificate (PEM); enables TLS when set
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Prefix of the generated client id
    #[serde(default)]
    pub client_id_prefix: Option<String>,
    /// Root of every topic (default: "pci")
    #[serde(default = "default_topic_base")]
    pub topic_base: String,
}

fn default_broker() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8883
}

fn default_keep_alive_secs() -> u64 {
    10
}

fn default_topic_base() -> String {
    "pci".to_string()
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            port: default_port(),
            username: None,
            password: None,
            ca_file: None,
            keep_alive_secs: default_keep_alive_secs(),
            client_id_prefix: None,
            topic_base: default_topic_base(),
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    /// Validate the broker settings.
    pub fn check(&self) -> Result<(), String> {
        if self.broker.is_empty() {
            return Err("mqtt.broker cannot be empty".to_string());
        }
        if self.topic_base.is_empty() {
            return Err("mqtt.topic_base cannot be empty".to_string());
        }
        if self.topic_base.contains(['#', '+']) {
            return Err(format!(
                "mqtt.topic_base '{}' must not contain wildcards",
                self.topic_base
            ));
        }
        if self.keep_alive_secs == 0 {
            return Err("mqtt.keep_alive_secs must be > 0".to_string());
        }
        if self.username.is_some() != self.password.is_some() {
            return Err("mqtt.username and mqtt.password must be set together".to_string());
        }
        Ok(())
    }
}

/// Map a configured QoS level.
pub fn qos_level(level: u8) -> Result<QoS, MqttError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(MqttError::InvalidQos(other)),
    }
}

/// Per-value QoS of the sensor topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorQos {
    #[serde(default)]
    pub potentiometer: u8,
    #[serde(default)]
    pub ultrasonic: u8,
    #[serde(default)]
    pub button_1: u8,
    #[serde(default)]
    pub button_2: u8,
}

impl SensorQos {
    fn levels(&self) -> [u8; 4] {
        [
            self.potentiometer,
            self.ultrasonic,
            self.button_1,
            self.button_2,
        ]
    }
}

/// Mirror loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Key prefix of the address space to mirror
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Time between two mirror cycles in milliseconds
    #[serde(default = "default_publish_period_ms")]
    pub publish_period_ms: u64,
    /// Delay before reconnecting to the address-space host
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Timeout of the liveliness check and of each browse
    #[serde(default = "default_browse_timeout_ms")]
    pub browse_timeout_ms: u64,
    #[serde(default)]
    pub sensor_qos: SensorQos,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_publish_period_ms() -> u64 {
    2000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_browse_timeout_ms() -> u64 {
    1000
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            publish_period_ms: default_publish_period_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            browse_timeout_ms: default_browse_timeout_ms(),
            sensor_qos: SensorQos::default(),
        }
    }
}

impl BridgeSettings {
    pub fn publish_period(&self) -> Duration {
        Duration::from_millis(self.publish_period_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn browse_timeout(&self) -> Duration {
        Duration::from_millis(self.browse_timeout_ms)
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Zenoh link to the address-space host
    #[serde(default)]
    pub zenoh: ZenohConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Apply the environment overrides (`TOPIC_BASE`, `PUBLISH_PERIOD` in
    /// seconds, `MQTT_BROKER`, `MQTT_PORT`, `PUB_QOS_REG0`..`PUB_QOS_REG3`).
    /// Environment wins over the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup("TOPIC_BASE") {
            self.mqtt.topic_base = base;
        }
        if let Some(broker) = lookup("MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = port
                .trim()
                .parse()
                .map_err(|_| format!("MQTT_PORT '{}' is not a port number", port))?;
        }
        if let Some(period) = lookup("PUBLISH_PERIOD") {
            let secs: f64 = period
                .trim()
                .parse()
                .map_err(|_| format!("PUBLISH_PERIOD '{}' is not a number of seconds", period))?;
            if !secs.is_finite() || secs <= 0.0 {
                return Err(format!("PUBLISH_PERIOD must be > 0, got {}", period));
            }
            self.bridge.publish_period_ms = (secs * 1000.0).round() as u64;
        }

        let qos = &mut self.bridge.sensor_qos;
        for (name, slot) in [
            ("PUB_QOS_REG0", &mut qos.potentiometer),
            ("PUB_QOS_REG1", &mut qos.ultrasonic),
            ("PUB_QOS_REG2", &mut qos.button_1),
            ("PUB_QOS_REG3", &mut qos.button_2),
        ] {
            if let Some(level) = lookup(name) {
                *slot = level
                    .trim()
                    .parse()
                    .map_err(|_| format!("{} '{}' is not a QoS level", name, level))?;
            }
        }

        Ok(())
    }

    /// Parse, apply overrides from `lookup`, then validate.
    pub fn parse_with_env<F>(content: &str, lookup: F) -> rtulink_framework::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Self = json5::from_str(content)?;
        config.apply_env(lookup).map_err(ProcessError::validation)?;
        config.validate()?;
        Ok(config)
    }
}

impl ProcessConfig for BridgeConfig {
    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> rtulink_framework::Result<()> {
        self.mqtt.check().map_err(ProcessError::validation)?;

        if self.bridge.key_prefix.is_empty() {
            return Err(ProcessError::validation("bridge.key_prefix cannot be empty"));
        }
        if self.bridge.publish_period_ms == 0
            || self.bridge.reconnect_delay_ms == 0
            || self.bridge.browse_timeout_ms == 0
        {
            return Err(ProcessError::validation(
                "publish_period_ms, reconnect_delay_ms and browse_timeout_ms must be > 0",
            ));
        }
        for level in self.bridge.sensor_qos.levels() {
            qos_level(level).map_err(|e| ProcessError::validation(e.to_string()))?;
        }
        Ok(())
    }

    fn parse(content: &str) -> rtulink_framework::Result<Self> {
        Self::parse_with_env(content, |name| std::env::var(name).ok())
    }
}
