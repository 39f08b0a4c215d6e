use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::liveness::SlaveStatus;
use crate::health::ComponentHealth;
use crate::snapshot::{Counters, SensorValues};

/// A read-only node in the address space hosted for the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Potentiometer,
    Ultrasonic,
    Button1,
    Button2,
    Accepted,
    CrcErrors,
    Unreachable,
    SlaveStatus,
    MasterStatus,
}

impl Tag {
    pub const ALL: [Tag; 9] = [
        Tag::Potentiometer,
        Tag::Ultrasonic,
        Tag::Button1,
        Tag::Button2,
        Tag::Accepted,
        Tag::CrcErrors,
        Tag::Unreachable,
        Tag::SlaveStatus,
        Tag::MasterStatus,
    ];

    /// Browse name of the node under the device object.
    pub fn node_name(&self) -> &'static str {
        match self {
            Tag::Potentiometer => "Potenciometro",
            Tag::Ultrasonic => "Distancia_Ultrasonido",
            Tag::Button1 => "Boton_1",
            Tag::Button2 => "Boton_2",
            Tag::Accepted => "Modbus_Aceptadas",
            Tag::CrcErrors => "Modbus_Error_CRC",
            Tag::Unreachable => "Modbus_No_Alcanzado",
            Tag::SlaveStatus => "Modbus_Estado_Esclavo",
            Tag::MasterStatus => "Modbus_Estado_Maestro",
        }
    }

    pub fn from_node_name(name: &str) -> Option<Tag> {
        Tag::ALL.into_iter().find(|tag| tag.node_name() == name)
    }

    /// Whether this node carries a health string rather than a number.
    pub fn is_status(&self) -> bool {
        matches!(self, Tag::SlaveStatus | Tag::MasterStatus)
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.node_name())
    }
}

/// Value held by a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Integer(u64),
    Text(String),
}

impl TagValue {
    /// Text form used for MQTT payloads.
    pub fn to_payload(&self) -> String {
        match self {
            TagValue::Integer(v) => v.to_string(),
            TagValue::Text(s) => s.clone(),
        }
    }
}

impl From<u64> for TagValue {
    fn from(v: u64) -> Self {
        TagValue::Integer(v)
    }
}

impl From<u16> for TagValue {
    fn from(v: u16) -> Self {
        TagValue::Integer(v as u64)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::Text(v.to_string())
    }
}

impl From<ComponentHealth> for TagValue {
    fn from(v: ComponentHealth) -> Self {
        TagValue::Text(v.as_str().to_string())
    }
}

impl From<SlaveStatus> for TagValue {
    fn from(v: SlaveStatus) -> Self {
        TagValue::Text(v.as_str().to_string())
    }
}

/// A tag value as published into the address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSample {
    pub tag: Tag,
    pub value: TagValue,
    /// Unix epoch milliseconds when the host set the value.
    pub timestamp: i64,
}

impl TagSample {
    pub fn new(tag: Tag, value: impl Into<TagValue>) -> Self {
        Self {
            tag,
            value: value.into(),
            timestamp: current_timestamp_millis(),
        }
    }
}

/// Samples for the four sensor tags.
pub fn sensor_samples(values: &SensorValues) -> [TagSample; 4] {
    [
        TagSample::new(Tag::Potentiometer, values.pot),
        TagSample::new(Tag::Ultrasonic, values.ultra),
        TagSample::new(Tag::Button1, values.btn1),
        TagSample::new(Tag::Button2, values.btn2),
    ]
}

/// Samples for the three published counters.
pub fn counter_samples(counters: &Counters) -> [TagSample; 3] {
    [
        TagSample::new(Tag::Accepted, counters.accepted),
        TagSample::new(Tag::CrcErrors, counters.crc_errors),
        TagSample::new(Tag::Unreachable, counters.unreachable),
    ]
}

/// Get the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SlaveState;

    #[test]
    fn test_node_names_round_trip() {
        for tag in Tag::ALL {
            assert_eq!(Tag::from_node_name(tag.node_name()), Some(tag));
        }
        assert_eq!(Tag::from_node_name("Temperatura"), None);
    }

    #[test]
    fn test_status_tags() {
        let status: Vec<_> = Tag::ALL.into_iter().filter(Tag::is_status).collect();
        assert_eq!(status, vec![Tag::SlaveStatus, Tag::MasterStatus]);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(TagValue::from(42u16), TagValue::Integer(42));
        assert_eq!(
            TagValue::from(ComponentHealth::Crashed),
            TagValue::Text("CRASHED".to_string())
        );
        assert_eq!(
            TagValue::from(SlaveStatus::Reported(SlaveState::Ok)).to_payload(),
            "OK"
        );
        assert_eq!(TagValue::Integer(7).to_payload(), "7");
    }

    #[test]
    fn test_untagged_value_json() {
        let sample = TagSample::new(Tag::Accepted, 12u64);
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["tag"], "accepted");
        assert_eq!(json["value"], 12);
    }

    #[test]
    fn test_sample_groups() {
        let values = SensorValues {
            pot: 1,
            ultra: 2,
            btn1: 3,
            btn2: 4,
        };
        let samples = sensor_samples(&values);
        assert_eq!(samples[1].tag, Tag::Ultrasonic);
        assert_eq!(samples[1].value, TagValue::Integer(2));

        let counters = Counters {
            unreachable: 9,
            ..Default::default()
        };
        let samples = counter_samples(&counters);
        assert_eq!(samples[2].tag, Tag::Unreachable);
        assert_eq!(samples[2].value, TagValue::Integer(9));
    }
}
