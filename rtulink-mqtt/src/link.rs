//! Broker connection plumbing on top of `rumqttc`.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MqttConfig;
use crate::error::{MqttError, Result};

/// Requests buffered between a client handle and its event loop.
pub const REQUEST_CAPACITY: usize = 10;

/// `<prefix>-<6 hex chars>`, so several instances can share a broker.
pub fn client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..6])
}

/// Build client options: credentials, keep-alive, optional last-will and
/// TLS when a CA certificate is configured.
///
/// A configured CA file that cannot be read is an error; the caller treats
/// it as fatal.
pub fn mqtt_options(
    config: &MqttConfig,
    client_id: &str,
    last_will: Option<LastWill>,
) -> Result<MqttOptions> {
    let mut options = MqttOptions::new(client_id, &config.broker, config.port);
    options.set_keep_alive(config.keep_alive());

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    if let Some(will) = last_will {
        options.set_last_will(will);
    }

    if let Some(ca_file) = &config.ca_file {
        let ca = std::fs::read(ca_file).map_err(|e| MqttError::CaCertificate {
            path: ca_file.display().to_string(),
            source: e,
        })?;
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        }));
        debug!(ca = %ca_file.display(), "TLS enabled");
    }

    Ok(options)
}

/// Create a client and its event loop.
pub fn connect(
    config: &MqttConfig,
    client_prefix: &str,
    last_will: Option<LastWill>,
) -> Result<(AsyncClient, EventLoop)> {
    let prefix = config
        .client_id_prefix
        .as_deref()
        .unwrap_or(client_prefix);
    let id = client_id(prefix);
    let options = mqtt_options(config, &id, last_will)?;

    info!(
        broker = %config.broker,
        port = config.port,
        client_id = %id,
        tls = config.ca_file.is_some(),
        "MQTT client created"
    );
    Ok(AsyncClient::new(options, REQUEST_CAPACITY))
}

/// What the event loop reported.
#[derive(Debug)]
pub enum LinkEvent {
    /// The broker accepted the session.
    Connected,
    /// An incoming publish.
    Message { topic: String, payload: Vec<u8> },
    /// The disconnect request went out.
    Closed,
    /// The connection failed; the next poll reconnects.
    Error(rumqttc::ConnectionError),
}

/// Poll the event loop until something other than protocol traffic happens.
pub async fn next_event(eventloop: &mut EventLoop) -> LinkEvent {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                debug!(code = ?ack.code, "ConnAck received");
                return LinkEvent::Connected;
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                return LinkEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => return LinkEvent::Closed,
            Ok(_) => {}
            Err(e) => return LinkEvent::Error(e),
        }
    }
}

/// Outbound side of a broker session.
#[async_trait]
pub trait BrokerLink: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl BrokerLink for AsyncClient {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        AsyncClient::publish(self, topic, qos, retain, payload).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        AsyncClient::disconnect(self).await?;
        Ok(())
    }
}

/// Keep the event loop running for a publish-only client until it has sent
/// its disconnect, or until a connection error after shutdown.
pub async fn drive(
    mut eventloop: EventLoop,
    mut shutdown: rtulink_framework::ShutdownSignal,
    reconnect_delay: std::time::Duration,
) {
    loop {
        match next_event(&mut eventloop).await {
            LinkEvent::Connected => info!("Connected to MQTT broker"),
            LinkEvent::Message { topic, .. } => debug!(topic = %topic, "Ignoring incoming publish"),
            LinkEvent::Closed => {
                info!("MQTT session closed");
                return;
            }
            LinkEvent::Error(e) => {
                if shutdown.is_triggered() {
                    warn!(error = %e, "MQTT connection lost during shutdown");
                    return;
                }
                warn!(error = %e, delay_ms = reconnect_delay.as_millis() as u64, "MQTT connection error, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.triggered() => {}
                }
            }
        }
    }
}
