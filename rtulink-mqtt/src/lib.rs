//! MQTT side of rtulink.
//!
//! The bridge connects to the hosted address space, browses the device's
//! tags and mirrors them onto MQTT topics under a configurable base, while
//! announcing its own health with a retained last-will. The broker settings
//! and topic layout are shared with the serial master's command intake.
//!
//! # Topics
//!
//! ```text
//! <base>/sensor/{pot,distancia}
//! <base>/datos/{boton_1,boton_2}
//! <base>/estadistica/{modbus_aceptadas,modbus_crc_error,modbus_no_alcanzado}
//! <base>/state/{modbus_esclavo,modbus_maestro,opc_server,opc_cliente}
//! <base>/value1/{dig,analog}
//! ```

pub mod address_space;
pub mod bridge;
pub mod config;
pub mod error;
pub mod link;
pub mod topics;

pub use address_space::{AddressSpace, ZenohAddressSpace};
pub use bridge::{Bridge, MirrorSettings, bridge_last_will};
pub use config::{BridgeConfig, BridgeSettings, MqttConfig, SensorQos, qos_level};
pub use error::{MqttError, Result};
pub use link::{BrokerLink, LinkEvent, client_id, mqtt_options, next_event};
pub use topics::{TopicClass, Topics};
