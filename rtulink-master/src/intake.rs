//! Command intake from MQTT.
//!
//! Subscribes to the digital and analog command topics and turns each
//! message into a queued [`Command`]. Nothing is acknowledged back.

use std::time::Duration;

use rtulink_framework::ShutdownSignal;
use rtulink_mqtt::{LinkEvent, MqttError, Topics, next_event};
use rumqttc::{AsyncClient, EventLoop, QoS};
use tracing::{debug, info, warn};

use crate::commands::{Command, CommandKind, CommandSender, PayloadError};
use crate::config::CommandConfig;

/// Client id prefix of the master.
pub const CLIENT_PREFIX: &str = "maestro-modbus";

/// Time allowed for the disconnect to go out on shutdown.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Which command a topic carries.
pub fn route(topics: &Topics, topic: &str) -> Option<CommandKind> {
    if topic == topics.command_digital() {
        Some(CommandKind::Digital)
    } else if topic == topics.command_analog() {
        Some(CommandKind::Analog)
    } else {
        None
    }
}

/// Parse one message and queue the command. Returns true if it was queued.
///
/// Out-of-range analog values are ignored quietly; anything that is not an
/// integer is ignored with a warning.
pub fn dispatch(
    topics: &Topics,
    mapping: &CommandConfig,
    sender: &CommandSender,
    topic: &str,
    payload: &[u8],
) -> bool {
    let Some(kind) = route(topics, topic) else {
        debug!(topic = %topic, "Ignoring message on unknown topic");
        return false;
    };

    let text = String::from_utf8_lossy(payload);
    match Command::from_payload(kind, &text, mapping) {
        Ok(command) => {
            info!(topic = %topic, command = %command, "Command received");
            sender.submit(command)
        }
        Err(PayloadError::OutOfRange(value)) => {
            debug!(topic = %topic, value, "Analog value out of range, ignored");
            false
        }
        Err(e) => {
            warn!(topic = %topic, error = %e, "Invalid command payload");
            false
        }
    }
}

/// Drives the MQTT session that feeds the command queue.
pub struct CommandIntake {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
    mapping: CommandConfig,
    sender: CommandSender,
    reconnect_delay: Duration,
}

impl CommandIntake {
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        topics: Topics,
        mapping: CommandConfig,
        sender: CommandSender,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            client,
            eventloop,
            topics,
            mapping,
            sender,
            reconnect_delay,
        }
    }

    /// Run until shutdown. Subscriptions are renewed on every connect.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<(), MqttError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                event = next_event(&mut self.eventloop) => event,
            };

            match event {
                LinkEvent::Connected => {
                    for topic in [self.topics.command_digital(), self.topics.command_analog()] {
                        self.client.subscribe(&topic, QoS::AtLeastOnce).await?;
                        info!(topic = %topic, "Subscribed to commands");
                    }
                }
                LinkEvent::Message { topic, payload } => {
                    dispatch(&self.topics, &self.mapping, &self.sender, &topic, &payload);
                }
                LinkEvent::Closed => return Ok(()),
                LinkEvent::Error(e) => {
                    warn!(
                        error = %e,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "MQTT connection error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = shutdown.triggered() => break,
                    }
                }
            }
        }

        if self.client.try_disconnect().is_ok() {
            let eventloop = &mut self.eventloop;
            let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
                while !matches!(
                    next_event(eventloop).await,
                    LinkEvent::Closed | LinkEvent::Error(_)
                ) {}
            })
            .await;
        }
        info!("Command intake stopped");
        Ok(())
    }
}
