//! Snapshot watcher.
//!
//! Reads the snapshot left by the serial master on a fixed cadence, refreshes
//! the sensor and counter tags from it and forwards master and slave health
//! when they change.

use std::time::Duration;

use rtulink_common::{
    Actor, ComponentHealth, HealthUpdate, LivenessTracker, Observation, SnapshotStore, Tag,
    TagSample, counter_samples, current_epoch_secs, observe, sensor_samples,
};
use rtulink_framework::ShutdownSignal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::sink::TagSink;

/// Watch loop cadence and staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub staleness: Duration,
}

impl From<&crate::config::HostSettings> for WatchSettings {
    fn from(settings: &crate::config::HostSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            staleness: settings.staleness(),
        }
    }
}

pub struct Watcher<S, K> {
    poll_interval: Duration,
    store: S,
    sink: K,
    tracker: LivenessTracker,
    shutdown: ShutdownSignal,
}

impl<S, K> Watcher<S, K>
where
    S: SnapshotStore,
    K: TagSink,
{
    pub fn new(settings: WatchSettings, store: S, sink: K, shutdown: ShutdownSignal) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            store,
            sink,
            tracker: LivenessTracker::new(settings.staleness),
            shutdown,
        }
    }

    pub fn tracker(&self) -> &LivenessTracker {
        &self.tracker
    }

    /// Show both status tags as STARTING before the first evaluation.
    pub async fn announce_start(&mut self) {
        self.emit(TagSample::new(Tag::MasterStatus, ComponentHealth::Starting))
            .await;
        self.emit(TagSample::new(Tag::SlaveStatus, ComponentHealth::Starting))
            .await;
        self.tracker.prime(ComponentHealth::Starting);
    }

    /// Read the snapshot once and evaluate it at `now` (epoch seconds).
    pub async fn poll_once(&mut self, now: u64) -> HealthUpdate {
        let observation = observe(&self.store);

        match &observation {
            Observation::Present(snapshot) => {
                if let Some(values) = &snapshot.values {
                    for sample in sensor_samples(values) {
                        self.emit(sample).await;
                    }
                }
                for sample in counter_samples(&snapshot.counters) {
                    self.emit(sample).await;
                }
            }
            Observation::Absent => debug!("No snapshot yet"),
            Observation::Unreadable => {}
        }

        let update = self.tracker.evaluate(observation, now);

        if let Some(master) = update.master {
            info!(actor = %Actor::SerialMaster, health = %master, "Master health changed");
            self.emit(TagSample::new(Tag::MasterStatus, master)).await;
        }
        if let Some(slave) = update.slave {
            info!(actor = %Actor::HardwareSlave, state = %slave, "Slave state changed");
            self.emit(TagSample::new(Tag::SlaveStatus, slave)).await;
        }

        update
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        info!(
            interval_ms = self.poll_interval.as_millis() as u64,
            staleness_secs = self.tracker.threshold().as_secs(),
            "Snapshot watcher started"
        );

        self.announce_start().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => break,
                _ = ticker.tick() => {
                    self.poll_once(current_epoch_secs()).await;
                }
            }
        }

        info!("Snapshot watcher stopped");
    }

    async fn emit(&self, sample: TagSample) {
        let tag = sample.tag;
        if let Err(e) = self.sink.publish(sample).await {
            warn!(tag = %tag, error = %e, "Failed to publish tag");
        }
    }
}
