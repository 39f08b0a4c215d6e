//! Topic layout shared by the bridge and the command intake.
//!
//! ```text
//! {base}/sensor/pot                   {base}/estadistica/modbus_aceptadas
//! {base}/sensor/distancia             {base}/estadistica/modbus_crc_error
//! {base}/datos/boton_1                {base}/estadistica/modbus_no_alcanzado
//! {base}/datos/boton_2                {base}/state/<actor>
//! {base}/value1/dig                   {base}/value1/analog
//! ```
//!
//! The bridge and host actors also have root topics (`opc_cliente`,
//! `opc_server`) outside the base, carrying the last-will.

use rtulink_common::{Actor, Tag};

/// How a tag is mirrored onto MQTT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    /// Sensor value; per-value QoS, not retained.
    Sensor,
    /// Transaction counter; QoS 1, not retained.
    Statistic,
    /// Health string; QoS 1, retained.
    State,
}

/// Topic names under one base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Topic and class for a mirrored tag.
    ///
    /// # Example
    /// ```
    /// use rtulink_common::Tag;
    /// use rtulink_mqtt::{TopicClass, Topics};
    ///
    /// let topics = Topics::new("pci");
    /// assert_eq!(
    ///     topics.for_tag(Tag::Ultrasonic),
    ///     ("pci/sensor/distancia".to_string(), TopicClass::Sensor)
    /// );
    /// ```
    pub fn for_tag(&self, tag: Tag) -> (String, TopicClass) {
        let (group, leaf, class) = match tag {
            Tag::Potentiometer => ("sensor", "pot", TopicClass::Sensor),
            Tag::Ultrasonic => ("sensor", "distancia", TopicClass::Sensor),
            Tag::Button1 => ("datos", "boton_1", TopicClass::Sensor),
            Tag::Button2 => ("datos", "boton_2", TopicClass::Sensor),
            Tag::Accepted => ("estadistica", "modbus_aceptadas", TopicClass::Statistic),
            Tag::CrcErrors => ("estadistica", "modbus_crc_error", TopicClass::Statistic),
            Tag::Unreachable => ("estadistica", "modbus_no_alcanzado", TopicClass::Statistic),
            Tag::SlaveStatus => return (self.state(Actor::HardwareSlave), TopicClass::State),
            Tag::MasterStatus => return (self.state(Actor::SerialMaster), TopicClass::State),
        };
        (format!("{}/{}/{}", self.base, group, leaf), class)
    }

    /// Retained health topic of an actor.
    pub fn state(&self, actor: Actor) -> String {
        format!("{}/state/{}", self.base, actor.topic_leaf())
    }

    /// Root topic outside the base, for the actors that own one.
    pub fn root(actor: Actor) -> Option<&'static str> {
        match actor {
            Actor::AddressSpaceHost | Actor::Bridge => Some(actor.topic_leaf()),
            Actor::HardwareSlave | Actor::SerialMaster => None,
        }
    }

    /// Digital output commands (`0`/`1`).
    pub fn command_digital(&self) -> String {
        format!("{}/value1/dig", self.base)
    }

    /// Analog output commands (`0..255`).
    pub fn command_analog(&self) -> String {
        format!("{}/value1/analog", self.base)
    }
}
