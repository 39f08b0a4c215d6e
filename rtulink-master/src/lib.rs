//! Modbus RTU serial master.
//!
//! Owns the serial line: polls the slave's four holding registers on a fixed
//! cadence, executes write commands between polls, and publishes every
//! outcome as a complete snapshot for the address-space host.
//!
//! # Modules
//!
//! - [`rtu`] - Frame encoding, CRC16 and response classification
//! - [`transport`] - Request/response exchange over a serial line
//! - [`session`] - The poll loop and its counters
//! - [`commands`] - Write commands and the bounded command queue
//! - [`intake`] - Command intake from MQTT
//! - [`config`] - Configuration

pub mod commands;
pub mod config;
pub mod intake;
pub mod rtu;
pub mod session;
pub mod transport;

pub use commands::{Command, CommandKind, CommandSender, command_queue};
pub use config::MasterConfig;
pub use rtu::{ExceptionCode, Frame, FunctionCode, TransactionResult};
pub use session::{Master, PollSettings, publish_stopped};
pub use transport::{Connector, RtuTransport, SerialConnector, StreamLine, Transport, TransportError};
