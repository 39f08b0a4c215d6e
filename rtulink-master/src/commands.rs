//! Write commands injected between poll cycles.
//!
//! Intents arrive asynchronously (over MQTT) and are queued on a bounded
//! channel whose only consumer is the task owning the serial line.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::CommandConfig;
use crate::rtu::{self, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// On/off output driven through a coil.
    Digital,
    /// 0..=255 output driven through a holding register.
    Analog,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Digital => f.write_str("digital"),
            CommandKind::Analog => f.write_str("analog"),
        }
    }
}

/// Why a command payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload '{0}' is not an integer")]
    NotInteger(String),
    #[error("value {0} is outside 0..=255")]
    OutOfRange(i64),
}

/// One write intent. Ephemeral: executed once, never acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub address: u16,
    pub value: u16,
}

impl Command {
    pub fn digital(address: u16, on: bool) -> Self {
        Self {
            kind: CommandKind::Digital,
            address,
            value: on as u16,
        }
    }

    pub fn analog(address: u16, value: u8) -> Self {
        Self {
            kind: CommandKind::Analog,
            address,
            value: value as u16,
        }
    }

    /// Parse a trimmed integer payload.
    ///
    /// Digital: `1` switches on, any other integer switches off.
    /// Analog: `0..=255`.
    pub fn from_payload(
        kind: CommandKind,
        payload: &str,
        mapping: &CommandConfig,
    ) -> Result<Self, PayloadError> {
        let text = payload.trim();
        let value: i64 = text
            .parse()
            .map_err(|_| PayloadError::NotInteger(text.to_string()))?;

        match kind {
            CommandKind::Digital => Ok(Self::digital(mapping.coil_address, value == 1)),
            CommandKind::Analog => match u8::try_from(value) {
                Ok(level) => Ok(Self::analog(mapping.analog_register, level)),
                Err(_) => Err(PayloadError::OutOfRange(value)),
            },
        }
    }

    /// The single write transaction carrying this command.
    pub fn to_frame(&self, slave_id: u8) -> Frame {
        match self.kind {
            CommandKind::Digital => rtu::encode_write_coil(slave_id, self.address, self.value != 0),
            CommandKind::Analog => rtu::encode_write_register(slave_id, self.address, self.value),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CommandKind::Digital => {
                let state = if self.value != 0 { "ON" } else { "OFF" };
                write!(f, "coil {} {}", self.address, state)
            }
            CommandKind::Analog => write!(f, "register {} = {}", self.address, self.value),
        }
    }
}

/// Producer side of the command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

/// Create the bounded queue between command intake and the poll loop.
pub fn command_queue(capacity: usize) -> (CommandSender, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx }, rx)
}

impl CommandSender {
    /// Queue a command without waiting. Returns false if it was dropped.
    pub fn submit(&self, command: Command) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!(command = %command, "Command queue full, dropping command");
                false
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                warn!(command = %command, "Poll loop gone, dropping command");
                false
            }
        }
    }
}
