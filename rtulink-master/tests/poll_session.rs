//! Poll loop scenarios over mocked serial lines, in paused time.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rtulink_common::{
    ComponentHealth, Counters, LivenessTracker, Observation, SensorValues, SlaveState,
    SlaveStatus, Snapshot, SnapshotStore,
};
use rtulink_framework::shutdown::{self, ShutdownTrigger};
use rtulink_master::rtu::{encode_read, encode_write_coil};
use rtulink_master::{Frame, FunctionCode};
use rtulink_master::{
    Command, Connector, Master, PollSettings, RtuTransport, StreamLine, Transport,
    TransportError, command_queue,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_test::io::{Builder, Mock};

const READ_RESPONSE: [u8; 13] = [
    0x01, 0x03, 0x08, 0x01, 0xF4, 0x00, 0x2A, 0x00, 0x01, 0x00, 0x00, 0xA9, 0xD2,
];

/// Hands out one mocked line per connect; fails to open once they run out.
struct ScriptedConnector {
    lines: VecDeque<Mock>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    fn new(lines: impl IntoIterator<Item = Mock>) -> Self {
        Self {
            lines: lines.into_iter().collect(),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.lines.pop_front() {
            Some(line) => Ok(Box::new(RtuTransport::new(
                StreamLine(line),
                Duration::from_secs(1),
            ))),
            None => Err(TransportError::Open {
                port: "mock".to_string(),
                message: "No such file or directory".to_string(),
            }),
        }
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

/// Keeps every snapshot written, in order.
#[derive(Default)]
struct RecordingStore {
    written: Mutex<Vec<Snapshot>>,
}

impl RecordingStore {
    fn states(&self) -> Vec<SlaveState> {
        self.written.lock().unwrap().iter().map(|s| s.state).collect()
    }

    fn snapshots(&self) -> Vec<Snapshot> {
        self.written.lock().unwrap().clone()
    }
}

impl SnapshotStore for RecordingStore {
    fn write(&self, snapshot: &Snapshot) -> rtulink_common::Result<()> {
        self.written.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    fn read(&self) -> rtulink_common::Result<Option<Snapshot>> {
        Ok(self.written.lock().unwrap().last().cloned())
    }
}

fn settings() -> PollSettings {
    PollSettings {
        slave_id: 1,
        start_address: 0,
        register_count: 4,
        poll_interval: Duration::from_secs(2),
        reconnect_delay: Duration::from_secs(5),
    }
}

struct Running {
    store: Arc<RecordingStore>,
    trigger: ShutdownTrigger,
    task: JoinHandle<Counters>,
}

fn start(connector: ScriptedConnector, commands: mpsc::Receiver<Command>) -> Running {
    start_with(settings(), connector, commands)
}

fn start_with<C: Connector + 'static>(
    settings: PollSettings,
    connector: C,
    commands: mpsc::Receiver<Command>,
) -> Running {
    let store = Arc::new(RecordingStore::default());
    let (trigger, signal) = shutdown::channel();
    let master = Master::new(settings, connector, store.clone(), commands, signal);
    Running {
        store,
        trigger,
        task: tokio::spawn(master.run()),
    }
}

impl Running {
    async fn stop_after(self, duration: Duration) -> (Arc<RecordingStore>, Counters) {
        tokio::time::sleep(duration).await;
        self.trigger.trigger();
        let counters = self.task.await.unwrap();
        (self.store, counters)
    }
}

#[tokio::test(start_paused = true)]
async fn test_valid_read_publishes_ok_and_host_sees_running() {
    let request = encode_read(1, 0, 4);
    let line = Builder::new()
        .write(request.as_bytes())
        .read(&READ_RESPONSE)
        .build();
    let (_sender, commands) = command_queue(4);

    let running = start(ScriptedConnector::new([line]), commands);
    let (store, counters) = running.stop_after(Duration::from_secs(1)).await;

    assert_eq!(
        store.states(),
        vec![SlaveState::Starting, SlaveState::Ok, SlaveState::Stopped]
    );
    let ok = store.snapshots()[1].clone();
    assert_eq!(
        ok.values,
        Some(SensorValues {
            pot: 500,
            ultra: 42,
            btn1: 1,
            btn2: 0
        })
    );
    assert_eq!(ok.counters.accepted, 1);
    assert_eq!(counters.accepted, 1);

    let document = serde_json::to_value(&ok).unwrap();
    assert_eq!(document["estado"], "OK");
    assert_eq!(document["potenciometro"], 500);

    let mut tracker = LivenessTracker::default();
    let update = tracker.evaluate(Observation::Present(ok.clone()), ok.timestamp);
    assert_eq!(update.master, Some(ComponentHealth::Running));
    assert_eq!(update.slave, Some(SlaveStatus::Reported(SlaveState::Ok)));
}

#[tokio::test(start_paused = true)]
async fn test_command_runs_between_reads_in_order() {
    let read = encode_read(1, 0, 4);
    let coil = encode_write_coil(1, 0, true);
    assert_eq!(coil.as_bytes(), [0x01, 0x05, 0x00, 0x00, 0xFF, 0x00, 0x8C, 0x3A]);

    // Any other order fails the mock's write assertions.
    let line = Builder::new()
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .write(coil.as_bytes())
        .read(coil.as_bytes())
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .build();

    let (sender, commands) = command_queue(4);
    assert!(sender.submit(Command::digital(0, true)));

    let running = start(ScriptedConnector::new([line]), commands);
    let (store, counters) = running.stop_after(Duration::from_secs(3)).await;

    // Writes are not snapshotted and not counted.
    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::Ok,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(counters.accepted, 2);
}

/// Read, the coil write, then the next read on one mocked line.
fn read_coil_read(read_delay: Duration) -> Mock {
    let read = encode_read(1, 0, 4);
    let coil = encode_write_coil(1, 0, true);
    Builder::new()
        .write(read.as_bytes())
        .wait(read_delay)
        .read(&READ_RESPONSE)
        .write(coil.as_bytes())
        .read(coil.as_bytes())
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .build()
}

#[tokio::test(start_paused = true)]
async fn test_command_submitted_during_read_waits_for_it() {
    let (sender, commands) = command_queue(4);
    let running = start(
        ScriptedConnector::new([read_coil_read(Duration::from_millis(500))]),
        commands,
    );

    // The first read is still waiting on the slave.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sender.submit(Command::digital(0, true)));

    let (store, counters) = running.stop_after(Duration::from_millis(2800)).await;

    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::Ok,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(counters.accepted, 2);
}

#[tokio::test(start_paused = true)]
async fn test_command_runs_when_reads_outlast_the_interval() {
    let mut fast = settings();
    fast.poll_interval = Duration::from_millis(500);

    // The read takes 800 ms, so the next tick is already due when it ends.
    let (sender, commands) = command_queue(4);
    let running = start_with(
        fast,
        ScriptedConnector::new([read_coil_read(Duration::from_millis(800))]),
        commands,
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(sender.submit(Command::digital(0, true)));

    // Stop before the tick after the second read.
    let (store, counters) = running.stop_after(Duration::from_millis(800)).await;

    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::Ok,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(counters.accepted, 2);
}

/// A slave that never answers: every exchange runs its full timeout.
/// Coil writes are echoed so the session stays up.
#[derive(Clone, Default)]
struct SilentSlave {
    reads: Arc<AtomicUsize>,
    coil_writes: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for SilentSlave {
    async fn exchange(&mut self, request: &Frame) -> Result<Vec<u8>, TransportError> {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match request.function() {
            FunctionCode::ReadHoldingRegisters => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
            FunctionCode::WriteSingleCoil => {
                self.coil_writes.fetch_add(1, Ordering::SeqCst);
                Ok(request.as_bytes().to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl Connector for SilentSlave {
    async fn connect(&mut self) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(self.clone()))
    }

    fn endpoint(&self) -> &str {
        "silent"
    }
}

#[tokio::test(start_paused = true)]
async fn test_silent_slave_does_not_starve_commands() {
    let mut fast = settings();
    fast.poll_interval = Duration::from_millis(500);

    let slave = SilentSlave::default();
    let (reads, coil_writes) = (slave.reads.clone(), slave.coil_writes.clone());
    let (sender, commands) = command_queue(4);
    let running = start_with(fast, slave, commands);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(sender.submit(Command::digital(0, true)));

    let (store, counters) = running.stop_after(Duration::from_secs(30)).await;

    assert_eq!(coil_writes.load(Ordering::SeqCst), 1);
    assert!(reads.load(Ordering::SeqCst) >= 20);
    assert_eq!(counters.accepted, 0);
    assert_eq!(counters.unreachable as usize, reads.load(Ordering::SeqCst));
    assert!(store.states().contains(&SlaveState::IncompleteFrame));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_are_counted_and_polling_continues() {
    let read = encode_read(1, 0, 4);
    let mut corrupted = READ_RESPONSE;
    corrupted[12] ^= 0x01;
    let exception = [0x01, 0x83, 0x02, 0xC0, 0xF1];

    let line = Builder::new()
        .write(read.as_bytes())
        .read(&corrupted)
        .write(read.as_bytes())
        .read(&exception)
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .build();
    let (_sender, commands) = command_queue(4);

    let running = start(ScriptedConnector::new([line]), commands);
    let (store, counters) = running.stop_after(Duration::from_secs(5)).await;

    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::CrcError,
            SlaveState::SlaveException,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(
        counters,
        Counters {
            accepted: 1,
            crc_errors: 1,
            unreachable: 0,
            exceptions: 1,
            malformed: 0,
        }
    );
    assert!(store.snapshots()[1].values.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_silent_slave_is_unreachable() {
    let read = encode_read(1, 0, 4);
    // No reply within the 1 s timeout, then a normal exchange.
    let line = Builder::new()
        .write(read.as_bytes())
        .wait(Duration::from_millis(1500))
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .build();
    let (_sender, commands) = command_queue(4);

    let running = start(ScriptedConnector::new([line]), commands);
    let (store, counters) = running.stop_after(Duration::from_secs(3)).await;

    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::IncompleteFrame,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(counters.unreachable, 1);
    assert_eq!(counters.accepted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_reconnects_and_discards_commands() {
    let read = encode_read(1, 0, 4);
    let broken = Builder::new()
        .write(read.as_bytes())
        .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        .build();
    // A stale command leaking into this session would fail its write assertions.
    let healthy = Builder::new()
        .write(read.as_bytes())
        .read(&READ_RESPONSE)
        .build();

    let (sender, commands) = command_queue(4);
    let connector = ScriptedConnector::new([broken, healthy]);
    let attempts = connector.attempts.clone();
    let running = start(connector, commands);

    // During the 5 s backoff.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(sender.submit(Command::digital(0, true)));

    let (store, counters) = running.stop_after(Duration::from_secs(5)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        store.states(),
        vec![
            SlaveState::Starting,
            SlaveState::Disconnected,
            SlaveState::Starting,
            SlaveState::Ok,
            SlaveState::Stopped
        ]
    );
    assert_eq!(store.snapshots()[1].counters.unreachable, 1);
    assert_eq!(counters.unreachable, 1);
    assert_eq!(counters.accepted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_port_open_failures_are_unreachable() {
    let (_sender, commands) = command_queue(4);
    let connector = ScriptedConnector::new([]);
    let attempts = connector.attempts.clone();

    // Attempts at 0, 5 and 10 s.
    let running = start(connector, commands);
    let (store, counters) = running.stop_after(Duration::from_secs(11)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(counters.unreachable, 3);
    assert_eq!(
        store.states(),
        vec![
            SlaveState::Disconnected,
            SlaveState::Disconnected,
            SlaveState::Disconnected,
            SlaveState::Stopped
        ]
    );
    assert_eq!(store.snapshots()[3].counters.unreachable, 3);
}
