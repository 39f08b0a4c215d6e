//! The poll loop that owns the serial line.
//!
//! One task holds the transport, so exactly one exchange is ever in flight.
//! Each cycle runs either the periodic read or one queued command, and every
//! read is followed by at most one queued command so back-to-back reads never
//! starve writes. Every read outcome is counted and published as a complete
//! snapshot; a transport failure tears the session down, publishes a
//! disconnected snapshot and retries after a fixed delay.

use std::time::Duration;

use rtulink_common::{Counters, SensorValues, SlaveState, Snapshot, SnapshotStore, current_epoch_secs};
use rtulink_framework::ShutdownSignal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::commands::Command;
use crate::config::MasterConfig;
use crate::rtu::{self, TransactionResult};
use crate::transport::{Connector, Transport};

/// Fold one read outcome into the counters.
///
/// `IncompleteFrame` and `TransportError` both mean the slave was not reached.
pub fn record(counters: &mut Counters, outcome: &TransactionResult) {
    match outcome {
        TransactionResult::Ok(_) => counters.accepted += 1,
        TransactionResult::CrcError => counters.crc_errors += 1,
        TransactionResult::SlaveException(_) => counters.exceptions += 1,
        TransactionResult::MalformedFrame => counters.malformed += 1,
        TransactionResult::IncompleteFrame | TransactionResult::TransportError => {
            counters.unreachable += 1
        }
    }
}

/// Publish a stopped snapshot for a master that exits before polling, so the
/// host reports it stopped rather than unknown.
pub fn publish_stopped<S: SnapshotStore + ?Sized>(store: &S) {
    let snapshot = Snapshot::status(SlaveState::Stopped, current_epoch_secs(), Counters::default());
    if let Err(e) = store.write(&snapshot) {
        warn!(error = %e, "Failed to write stopped snapshot");
    }
}

/// Fixed settings of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub slave_id: u8,
    pub start_address: u16,
    pub register_count: u16,
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
}

impl From<&MasterConfig> for PollSettings {
    fn from(config: &MasterConfig) -> Self {
        Self {
            slave_id: config.serial.slave_id,
            start_address: config.serial.start_address,
            register_count: config.serial.register_count,
            poll_interval: config.master.poll_interval(),
            reconnect_delay: config.master.reconnect_delay(),
        }
    }
}

/// How a transport session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    /// The line failed during a poll read; counted as unreachable.
    ReadFailed,
    /// The line failed during a command write; not counted.
    WriteFailed,
}

/// Serial master: sole writer of the snapshot.
pub struct Master<C, S> {
    settings: PollSettings,
    connector: C,
    store: S,
    commands: mpsc::Receiver<Command>,
    shutdown: ShutdownSignal,
    counters: Counters,
}

impl<C: Connector, S: SnapshotStore> Master<C, S> {
    pub fn new(
        settings: PollSettings,
        connector: C,
        store: S,
        commands: mpsc::Receiver<Command>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            settings,
            connector,
            store,
            commands,
            shutdown,
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Run until shutdown, then publish the stopped snapshot.
    pub async fn run(mut self) -> Counters {
        info!(
            port = %self.connector.endpoint(),
            slave = self.settings.slave_id,
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Serial master starting"
        );

        while !self.shutdown.is_triggered() {
            let end = match self.connector.connect().await {
                Ok(transport) => {
                    info!(port = %self.connector.endpoint(), "Serial session opened");
                    self.publish(SlaveState::Starting, None);
                    self.run_session(transport).await
                }
                Err(e) => {
                    warn!(port = %self.connector.endpoint(), error = %e, "Serial port unavailable");
                    SessionEnd::ReadFailed
                }
            };

            if end == SessionEnd::Shutdown {
                break;
            }
            if end == SessionEnd::ReadFailed {
                record(&mut self.counters, &TransactionResult::TransportError);
            }
            self.publish(SlaveState::Disconnected, None);

            info!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "Reconnecting after backoff"
            );
            if !self.backoff().await {
                break;
            }
        }

        self.publish(SlaveState::Stopped, None);
        info!(
            accepted = self.counters.accepted,
            crc_errors = self.counters.crc_errors,
            unreachable = self.counters.unreachable,
            "Serial master stopped"
        );
        self.counters
    }

    async fn run_session(&mut self, mut transport: Box<dyn Transport>) -> SessionEnd {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.triggered() => return SessionEnd::Shutdown,
                _ = ticker.tick() => {
                    if !self.poll_once(transport.as_mut()).await {
                        return SessionEnd::ReadFailed;
                    }
                    // A read that outlasts the interval leaves the next tick
                    // already due, so queued commands get a turn here too.
                    if let Ok(command) = self.commands.try_recv() {
                        if !self.execute(transport.as_mut(), command).await {
                            return SessionEnd::WriteFailed;
                        }
                    }
                }
                Some(command) = self.commands.recv() => {
                    if !self.execute(transport.as_mut(), command).await {
                        return SessionEnd::WriteFailed;
                    }
                }
            }
        }
    }

    /// One read transaction. Returns false when the transport failed.
    async fn poll_once(&mut self, transport: &mut dyn Transport) -> bool {
        let request = rtu::encode_read(
            self.settings.slave_id,
            self.settings.start_address,
            self.settings.register_count,
        );

        let outcome = match transport.exchange(&request).await {
            Ok(bytes) => rtu::decode(&request, &bytes),
            Err(e) => {
                warn!(error = %e, "Serial transport failed during read");
                return false;
            }
        };

        let values = match &outcome {
            TransactionResult::Ok(registers) => SensorValues::from_registers(registers),
            _ => None,
        };
        let outcome = match (outcome, values) {
            (TransactionResult::Ok(registers), None) => {
                warn!(count = registers.len(), "Unexpected register count in response");
                TransactionResult::MalformedFrame
            }
            (outcome, _) => outcome,
        };

        record(&mut self.counters, &outcome);
        match &outcome {
            TransactionResult::Ok(registers) => debug!(values = ?registers, "Read accepted"),
            other => warn!(outcome = %other, "Read failed"),
        }

        self.publish(outcome.slave_state(), values);
        true
    }

    /// One write transaction. Returns false when the transport failed.
    async fn execute(&mut self, transport: &mut dyn Transport, command: Command) -> bool {
        let request = command.to_frame(self.settings.slave_id);
        info!(command = %command, "Executing command");

        match transport.exchange(&request).await {
            Ok(bytes) => {
                match rtu::decode(&request, &bytes) {
                    TransactionResult::Ok(_) => debug!(command = %command, "Command echoed"),
                    other => warn!(command = %command, outcome = %other, "Command not confirmed"),
                }
                true
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Serial transport failed during write");
                false
            }
        }
    }

    /// Wait out the reconnect delay. Commands arriving meanwhile have no
    /// session to run on and are discarded. Returns false on shutdown.
    async fn backoff(&mut self) -> bool {
        let sleep = tokio::time::sleep(self.settings.reconnect_delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = self.shutdown.triggered() => return false,
                Some(command) = self.commands.recv() => {
                    warn!(command = %command, "No serial session open, command discarded");
                }
            }
        }
    }

    fn publish(&self, state: SlaveState, values: Option<SensorValues>) {
        let timestamp = current_epoch_secs();
        let snapshot = match values {
            Some(values) => Snapshot::ok(timestamp, values, self.counters),
            None => Snapshot::status(state, timestamp, self.counters),
        };
        if let Err(e) = self.store.write(&snapshot) {
            warn!(state = %state, error = %e, "Failed to write snapshot, retrying next cycle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtu::ExceptionCode;
    use rtulink_common::{
        ComponentHealth, LivenessTracker, MemorySnapshotStore, Observation, SlaveStatus,
    };

    #[test]
    fn test_counter_mapping() {
        let mut counters = Counters::default();
        for outcome in [
            TransactionResult::Ok(vec![1, 2, 3, 4]),
            TransactionResult::Ok(vec![1, 2, 3, 4]),
            TransactionResult::CrcError,
            TransactionResult::SlaveException(ExceptionCode::IllegalDataAddress),
            TransactionResult::MalformedFrame,
            TransactionResult::IncompleteFrame,
            TransactionResult::TransportError,
        ] {
            record(&mut counters, &outcome);
        }

        assert_eq!(
            counters,
            Counters {
                accepted: 2,
                crc_errors: 1,
                unreachable: 2,
                exceptions: 1,
                malformed: 1,
            }
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = MasterConfig::default();
        let settings = PollSettings::from(&config);
        assert_eq!(settings.slave_id, 1);
        assert_eq!(settings.register_count, 4);
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.reconnect_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_publish_stopped_before_polling() {
        let store = MemorySnapshotStore::new();
        publish_stopped(&store);

        let snapshot = store.read().unwrap().unwrap();
        assert_eq!(snapshot.state, SlaveState::Stopped);
        assert_eq!(snapshot.counters, Counters::default());
        assert!(snapshot.values.is_none());

        // Long after the write, the host still sees a stopped master.
        let mut tracker = LivenessTracker::default();
        let update = tracker.evaluate(Observation::Present(snapshot.clone()), snapshot.timestamp + 60);
        assert_eq!(update.master, Some(ComponentHealth::Stopped));
        assert_eq!(update.slave, Some(SlaveStatus::Reported(SlaveState::Stopped)));
    }
}
