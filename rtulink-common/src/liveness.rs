//! Liveness derivation for the serial master and the hardware slave.
//!
//! Both values are pure functions of the most recently read snapshot and the
//! current time. [`LivenessTracker`] adds the per-actor edge triggers so
//! callers only forward genuine changes.

use std::time::Duration;

use crate::exchange::Observation;
use crate::health::{ComponentHealth, EdgeTrigger};
use crate::snapshot::{SlaveState, Snapshot};

/// Default maximum snapshot age still considered evidence of liveness.
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(10);

/// A snapshot is stale when its age strictly exceeds the threshold.
pub fn is_stale(snapshot: &Snapshot, now: u64, threshold: Duration) -> bool {
    snapshot.age_secs(now) > threshold.as_secs()
}

/// Health of the serial master as seen through snapshot freshness.
pub fn master_health(snapshot: Option<&Snapshot>, now: u64, threshold: Duration) -> ComponentHealth {
    match snapshot {
        None => ComponentHealth::Unknown,
        Some(s) if !is_stale(s, now, threshold) => ComponentHealth::Running,
        Some(s) if s.state == SlaveState::Stopped => ComponentHealth::Stopped,
        Some(_) => ComponentHealth::Crashed,
    }
}

/// Status of the hardware slave: the literal outcome of the last transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlaveStatus {
    /// No snapshot observed.
    Unknown,
    Reported(SlaveState),
}

impl SlaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaveStatus::Unknown => ComponentHealth::Unknown.as_str(),
            SlaveStatus::Reported(state) => state.as_str(),
        }
    }
}

impl std::fmt::Display for SlaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn slave_status(snapshot: Option<&Snapshot>) -> SlaveStatus {
    snapshot.map_or(SlaveStatus::Unknown, |s| SlaveStatus::Reported(s.state))
}

/// Result of one evaluation: the values to forward, if they changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthUpdate {
    pub master: Option<ComponentHealth>,
    pub slave: Option<SlaveStatus>,
}

impl HealthUpdate {
    pub fn is_empty(&self) -> bool {
        self.master.is_none() && self.slave.is_none()
    }
}

/// Tracks master and slave health for the address-space host.
#[derive(Debug)]
pub struct LivenessTracker {
    threshold: Duration,
    latest: Option<Snapshot>,
    master: EdgeTrigger<ComponentHealth>,
    slave: EdgeTrigger<SlaveStatus>,
}

impl LivenessTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            latest: None,
            master: EdgeTrigger::new(),
            slave: EdgeTrigger::new(),
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Most recently successfully read snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Record a placeholder already shown to consumers, so an identical
    /// computed value is not emitted twice.
    pub fn prime(&mut self, master: ComponentHealth) {
        self.master.prime(master);
    }

    /// Fold in one read attempt and evaluate at `now` (epoch seconds).
    ///
    /// An unreadable snapshot keeps the previous one, so only freshness can
    /// change on that cycle.
    pub fn evaluate(&mut self, observation: Observation, now: u64) -> HealthUpdate {
        match observation {
            Observation::Present(snapshot) => self.latest = Some(snapshot),
            Observation::Absent => self.latest = None,
            Observation::Unreadable => {}
        }

        let master = master_health(self.latest.as_ref(), now, self.threshold);
        let slave = slave_status(self.latest.as_ref());

        HealthUpdate {
            master: self.master.update(master),
            slave: self.slave.update(slave),
        }
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(DEFAULT_STALENESS)
    }
}
