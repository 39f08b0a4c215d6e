//! The mirror loop: address space in, MQTT topics out.
//!
//! The bridge tracks two actors. Its own health is announced as RUNNING at
//! start, covered by a retained last-will for crashes, and replaced by
//! STOPPED on a clean exit. The host's health follows connect/browse
//! outcomes. Both are edge-triggered, as are the mirrored status tags;
//! sensor and counter values are republished every cycle.

use std::collections::HashMap;
use std::time::Duration;

use rtulink_common::{Actor, ComponentHealth, EdgeTrigger, HealthEmitter, Tag, TagValue};
use rtulink_framework::ShutdownSignal;
use rumqttc::{LastWill, QoS};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::address_space::AddressSpace;
use crate::config::{BridgeSettings, qos_level};
use crate::error::Result;
use crate::link::BrokerLink;
use crate::topics::{TopicClass, Topics};

/// QoS of counters and status topics.
pub const STATUS_QOS: QoS = QoS::AtLeastOnce;

/// Time allowed for the shutdown publishes to go out.
pub const FINAL_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Client id prefix of the bridge.
pub const CLIENT_PREFIX: &str = "Cliente_OPC_MQTT_Modbus_QoS";

/// Last-will registered with the broker: the bridge's root topic turns
/// CRASHED if the session drops without a clean disconnect.
pub fn bridge_last_will() -> LastWill {
    LastWill::new(
        Actor::Bridge.topic_leaf(),
        ComponentHealth::Crashed.as_str(),
        STATUS_QOS,
        true,
    )
}

/// Resolved mirror loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorSettings {
    pub publish_period: Duration,
    pub reconnect_delay: Duration,
    /// QoS of the potentiometer, ultrasonic and two button topics.
    pub sensor_qos: [QoS; 4],
}

impl MirrorSettings {
    pub fn from_config(settings: &BridgeSettings) -> Result<Self> {
        let qos = &settings.sensor_qos;
        Ok(Self {
            publish_period: settings.publish_period(),
            reconnect_delay: settings.reconnect_delay(),
            sensor_qos: [
                qos_level(qos.potentiometer)?,
                qos_level(qos.ultrasonic)?,
                qos_level(qos.button_1)?,
                qos_level(qos.button_2)?,
            ],
        })
    }

    fn qos_for(&self, tag: Tag) -> QoS {
        match tag {
            Tag::Potentiometer => self.sensor_qos[0],
            Tag::Ultrasonic => self.sensor_qos[1],
            Tag::Button1 => self.sensor_qos[2],
            Tag::Button2 => self.sensor_qos[3],
            _ => STATUS_QOS,
        }
    }
}

/// Mirrors the address space onto MQTT until shutdown.
pub struct Bridge<A, L> {
    space: A,
    link: L,
    topics: Topics,
    settings: MirrorSettings,
    shutdown: ShutdownSignal,
    health: HealthEmitter,
    mirrored: HashMap<Tag, EdgeTrigger<TagValue>>,
}

impl<A: AddressSpace, L: BrokerLink> Bridge<A, L> {
    pub fn new(
        space: A,
        link: L,
        topics: Topics,
        settings: MirrorSettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            space,
            link,
            topics,
            settings,
            shutdown,
            health: HealthEmitter::new(),
            mirrored: HashMap::new(),
        }
    }

    /// Last health forwarded for `actor`.
    pub fn health(&self, actor: Actor) -> Option<ComponentHealth> {
        self.health.last(actor)
    }

    /// Run until shutdown, then announce STOPPED and disconnect.
    pub async fn run(mut self) -> Result<()> {
        let mut shutdown = self.shutdown.clone();
        info!(
            base = %self.topics.base(),
            period_ms = self.settings.publish_period.as_millis() as u64,
            "Bridge starting"
        );

        self.set_health(Actor::Bridge, ComponentHealth::Running).await?;

        'reconnect: while !shutdown.is_triggered() {
            match self.space.connect().await {
                Ok(()) => {
                    info!("Connected to address space host");
                    self.set_health(Actor::AddressSpaceHost, ComponentHealth::Running)
                        .await?;
                    self.mirror(&mut shutdown).await?;
                }
                Err(e) if e.is_host_failure() => {
                    warn!(error = %e, "Address space host unavailable");
                    self.set_health(Actor::AddressSpaceHost, ComponentHealth::Crashed)
                        .await?;
                }
                Err(e) => return Err(e),
            }

            if shutdown.is_triggered() {
                break 'reconnect;
            }
            debug!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "Retrying address space host"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                _ = shutdown.triggered() => break 'reconnect,
            }
        }

        self.finish().await;
        Ok(())
    }

    /// Mirror every period until the host fails or shutdown is signalled.
    async fn mirror(&mut self, shutdown: &mut ShutdownSignal) -> Result<()> {
        let mut ticker = tokio::time::interval(self.settings.publish_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => return Ok(()),
                _ = ticker.tick() => {}
            }
            // A blocked publish must not hold up shutdown.
            let result = tokio::select! {
                biased;
                _ = shutdown.triggered() => return Ok(()),
                result = self.mirror_once() => result,
            };

            match result {
                Ok(published) => debug!(published, "Mirror cycle complete"),
                Err(e) if e.is_host_failure() => {
                    warn!(error = %e, "Lost the address space host");
                    self.set_health(Actor::AddressSpaceHost, ComponentHealth::Crashed)
                        .await?;
                    // Republish status tags once the host is back.
                    self.mirrored.clear();
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Browse once and publish every value. Returns the number of publishes.
    pub async fn mirror_once(&mut self) -> Result<usize> {
        let samples = self.space.browse().await?;
        let mut published = 0;

        for sample in &samples {
            let (topic, class) = self.topics.for_tag(sample.tag);
            let (qos, retain) = match class {
                TopicClass::Sensor => (self.settings.qos_for(sample.tag), false),
                TopicClass::Statistic => (STATUS_QOS, false),
                TopicClass::State => {
                    let trigger = self.mirrored.entry(sample.tag).or_default();
                    if trigger.update(sample.value.clone()).is_none() {
                        continue;
                    }
                    info!(tag = %sample.tag, state = %sample.value.to_payload(), "Status changed");
                    (STATUS_QOS, true)
                }
            };

            self.link
                .publish(&topic, sample.value.to_payload().into_bytes(), qos, retain)
                .await?;
            published += 1;
        }

        Ok(published)
    }

    /// Forward an actor's health if it changed: retained, on the state topic
    /// and on the actor's root topic.
    async fn set_health(&mut self, actor: Actor, health: ComponentHealth) -> Result<()> {
        let Some(health) = self.health.update(actor, health) else {
            return Ok(());
        };
        info!(actor = %actor, health = %health, "Health changed");

        let payload = health.as_str().as_bytes().to_vec();
        self.link
            .publish(&self.topics.state(actor), payload.clone(), STATUS_QOS, true)
            .await?;
        if let Some(root) = Topics::root(actor) {
            self.link.publish(root, payload, STATUS_QOS, true).await?;
        }
        Ok(())
    }

    /// Announce STOPPED, clear the retained root markers and disconnect.
    async fn finish(&mut self) {
        info!("Bridge stopping");
        let outcome = tokio::time::timeout(FINAL_PUBLISH_TIMEOUT, async {
            self.set_health(Actor::Bridge, ComponentHealth::Stopped).await?;
            for actor in [Actor::Bridge, Actor::AddressSpaceHost] {
                if let Some(root) = Topics::root(actor) {
                    self.link.publish(root, Vec::new(), STATUS_QOS, true).await?;
                }
            }
            self.link.disconnect().await
        })
        .await;

        match outcome {
            Ok(Ok(())) => info!("Bridge stopped cleanly"),
            Ok(Err(e)) => warn!(error = %e, "Failed to publish final status"),
            Err(_) => warn!("Timed out publishing final status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorQos;

    #[test]
    fn test_last_will() {
        let will = bridge_last_will();
        assert_eq!(will.topic, "opc_cliente");
        assert_eq!(will.message.as_ref(), b"CRASHED");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn test_settings_from_config() {
        let config = BridgeSettings {
            sensor_qos: SensorQos {
                potentiometer: 1,
                button_2: 2,
                ..SensorQos::default()
            },
            ..BridgeSettings::default()
        };
        let settings = MirrorSettings::from_config(&config).unwrap();

        assert_eq!(settings.publish_period, Duration::from_secs(2));
        assert_eq!(settings.qos_for(Tag::Potentiometer), QoS::AtLeastOnce);
        assert_eq!(settings.qos_for(Tag::Ultrasonic), QoS::AtMostOnce);
        assert_eq!(settings.qos_for(Tag::Button2), QoS::ExactlyOnce);
        assert_eq!(settings.qos_for(Tag::Accepted), QoS::AtLeastOnce);
    }
}
