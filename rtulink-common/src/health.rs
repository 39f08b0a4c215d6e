//! Component health values and edge-triggered propagation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Health of one monitored actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentHealth {
    /// The actor is alive and reporting.
    Running,
    /// The actor stopped reporting without announcing it.
    Crashed,
    /// The actor announced a clean shutdown.
    Stopped,
    /// The actor is coming up; nothing evaluated yet.
    Starting,
    /// Nothing has been observed.
    #[default]
    Unknown,
}

impl ComponentHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentHealth::Running => "RUNNING",
            ComponentHealth::Crashed => "CRASHED",
            ComponentHealth::Stopped => "STOPPED",
            ComponentHealth::Starting => "STARTING",
            ComponentHealth::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ComponentHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actors whose health is tracked across the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The Modbus slave device on the serial line.
    HardwareSlave,
    /// The process driving the serial line.
    SerialMaster,
    /// The process hosting the tag tree.
    AddressSpaceHost,
    /// The process mirroring tags onto MQTT.
    Bridge,
}

impl Actor {
    pub const ALL: [Actor; 4] = [
        Actor::HardwareSlave,
        Actor::SerialMaster,
        Actor::AddressSpaceHost,
        Actor::Bridge,
    ];

    /// Status topic leaf for this actor, shared with existing dashboards.
    pub fn topic_leaf(&self) -> &'static str {
        match self {
            Actor::HardwareSlave => "modbus_esclavo",
            Actor::SerialMaster => "modbus_maestro",
            Actor::AddressSpaceHost => "opc_server",
            Actor::Bridge => "opc_cliente",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Actor::HardwareSlave => "hardware_slave",
            Actor::SerialMaster => "serial_master",
            Actor::AddressSpaceHost => "address_space_host",
            Actor::Bridge => "bridge",
        };
        f.write_str(name)
    }
}

/// Forwards a value only when it differs from the last one forwarded.
///
/// The cached value lives only in memory; a fresh trigger forwards the
/// first value it sees.
#[derive(Debug, Clone)]
pub struct EdgeTrigger<T> {
    last: Option<T>,
}

impl<T> Default for EdgeTrigger<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: PartialEq + Clone> EdgeTrigger<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a newly computed value. Returns it if it must be emitted.
    pub fn update(&mut self, value: T) -> Option<T> {
        if self.last.as_ref() == Some(&value) {
            return None;
        }
        self.last = Some(value.clone());
        Some(value)
    }

    /// Record a value emitted out of band (e.g. an initial placeholder).
    pub fn prime(&mut self, value: T) {
        self.last = Some(value);
    }

    /// Last value forwarded, if any.
    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    /// Forget the cached value so the next update is always forwarded.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Edge triggers keyed per actor.
#[derive(Debug, Default)]
pub struct HealthEmitter {
    triggers: HashMap<Actor, EdgeTrigger<ComponentHealth>>,
}

impl HealthEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a newly computed health for `actor`. Returns it if it changed.
    pub fn update(&mut self, actor: Actor, health: ComponentHealth) -> Option<ComponentHealth> {
        self.triggers.entry(actor).or_default().update(health)
    }

    pub fn prime(&mut self, actor: Actor, health: ComponentHealth) {
        self.triggers.entry(actor).or_default().prime(health);
    }

    pub fn last(&self, actor: Actor) -> Option<ComponentHealth> {
        self.triggers.get(&actor).and_then(|t| t.last().copied())
    }

    /// Forget every cached value, e.g. after a broker reconnect so the next
    /// evaluation republishes everything.
    pub fn reset(&mut self) {
        self.triggers.values_mut().for_each(EdgeTrigger::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_default_and_display() {
        assert_eq!(ComponentHealth::default(), ComponentHealth::Unknown);
        assert_eq!(ComponentHealth::Running.to_string(), "RUNNING");
        assert_eq!(ComponentHealth::Crashed.to_string(), "CRASHED");
        assert_eq!(
            serde_json::to_string(&ComponentHealth::Stopped).unwrap(),
            "\"STOPPED\""
        );
    }

    #[test]
    fn test_actor_topics() {
        assert_eq!(Actor::HardwareSlave.topic_leaf(), "modbus_esclavo");
        assert_eq!(Actor::SerialMaster.topic_leaf(), "modbus_maestro");
        assert_eq!(Actor::AddressSpaceHost.topic_leaf(), "opc_server");
        assert_eq!(Actor::Bridge.topic_leaf(), "opc_cliente");
    }

    #[test]
    fn test_identical_values_emit_once() {
        let mut trigger = EdgeTrigger::new();
        let emitted: Vec<_> = (0..25)
            .filter_map(|_| trigger.update(ComponentHealth::Running))
            .collect();
        assert_eq!(emitted, vec![ComponentHealth::Running]);
    }

    #[test]
    fn test_change_emits_again() {
        let mut trigger = EdgeTrigger::new();
        assert_eq!(
            trigger.update(ComponentHealth::Running),
            Some(ComponentHealth::Running)
        );
        assert_eq!(trigger.update(ComponentHealth::Running), None);
        assert_eq!(
            trigger.update(ComponentHealth::Crashed),
            Some(ComponentHealth::Crashed)
        );
        assert_eq!(
            trigger.update(ComponentHealth::Running),
            Some(ComponentHealth::Running)
        );
        assert_eq!(trigger.last(), Some(&ComponentHealth::Running));
    }

    #[test]
    fn test_prime_and_reset() {
        let mut trigger = EdgeTrigger::new();
        trigger.prime(ComponentHealth::Starting);
        assert_eq!(trigger.update(ComponentHealth::Starting), None);

        trigger.reset();
        assert_eq!(
            trigger.update(ComponentHealth::Starting),
            Some(ComponentHealth::Starting)
        );
    }

    #[test]
    fn test_emitter_tracks_actors_independently() {
        let mut emitter = HealthEmitter::new();
        assert_eq!(
            emitter.update(Actor::AddressSpaceHost, ComponentHealth::Running),
            Some(ComponentHealth::Running)
        );
        assert_eq!(
            emitter.update(Actor::Bridge, ComponentHealth::Running),
            Some(ComponentHealth::Running)
        );
        assert_eq!(
            emitter.update(Actor::AddressSpaceHost, ComponentHealth::Running),
            None
        );
        assert_eq!(
            emitter.update(Actor::AddressSpaceHost, ComponentHealth::Crashed),
            Some(ComponentHealth::Crashed)
        );
        assert_eq!(emitter.last(Actor::Bridge), Some(ComponentHealth::Running));
        assert_eq!(emitter.last(Actor::SerialMaster), None);

        emitter.reset();
        assert_eq!(
            emitter.update(Actor::Bridge, ComponentHealth::Running),
            Some(ComponentHealth::Running)
        );
    }
}
