//! The snapshot record exchanged between the serial master and the
//! address-space host.
//!
//! The persisted document keeps the field names of the deployed schema
//! (`estado`, `timestamp_lectura`, `potenciometro`, ...). [`Snapshot`] is the
//! typed view; conversion goes through [`SnapshotDocument`] so that every
//! decoded instance is checked for consistency.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

/// Self-reported state of the master/slave link, as persisted in `estado`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaveState {
    /// Last read transaction succeeded.
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR_CRC")]
    CrcError,
    #[serde(rename = "ERROR_ESCLAVO")]
    SlaveException,
    #[serde(rename = "ERROR_TRAMA_INCOMPLETA")]
    IncompleteFrame,
    #[serde(rename = "ERROR_TRAMA_MALFORMADA")]
    MalformedFrame,
    /// The serial port is gone or could not be opened.
    #[serde(rename = "ERROR_DESCONECTADO")]
    Disconnected,
    /// A transport session was just opened.
    #[serde(rename = "INICIANDO")]
    Starting,
    /// The master shut down cleanly.
    #[serde(rename = "DETENIDO")]
    Stopped,
}

impl SlaveState {
    /// Wire string, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlaveState::Ok => "OK",
            SlaveState::CrcError => "ERROR_CRC",
            SlaveState::SlaveException => "ERROR_ESCLAVO",
            SlaveState::IncompleteFrame => "ERROR_TRAMA_INCOMPLETA",
            SlaveState::MalformedFrame => "ERROR_TRAMA_MALFORMADA",
            SlaveState::Disconnected => "ERROR_DESCONECTADO",
            SlaveState::Starting => "INICIANDO",
            SlaveState::Stopped => "DETENIDO",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SlaveState::Ok)
    }
}

impl std::fmt::Display for SlaveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed register map read from the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorValues {
    pub pot: u16,
    pub ultra: u16,
    pub btn1: u16,
    pub btn2: u16,
}

impl SensorValues {
    /// Number of holding registers backing the map.
    pub const REGISTER_COUNT: u16 = 4;

    /// Build from registers in map order. Returns `None` unless exactly four are given.
    pub fn from_registers(registers: &[u16]) -> Option<Self> {
        match registers {
            [pot, ultra, btn1, btn2] => Some(Self {
                pot: *pot,
                ultra: *ultra,
                btn1: *btn1,
                btn2: *btn2,
            }),
            _ => None,
        }
    }
}

/// Transaction counters, monotonically increasing for the life of a master process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub accepted: u64,
    pub crc_errors: u64,
    pub unreachable: u64,
    pub exceptions: u64,
    pub malformed: u64,
}

/// One complete, self-consistent state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotDocument", into = "SnapshotDocument")]
pub struct Snapshot {
    pub state: SlaveState,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Present exactly when `state` is [`SlaveState::Ok`].
    pub values: Option<SensorValues>,
    pub counters: Counters,
}

impl Snapshot {
    /// Snapshot for a successful read.
    pub fn ok(timestamp: u64, values: SensorValues, counters: Counters) -> Self {
        Self {
            state: SlaveState::Ok,
            timestamp,
            values: Some(values),
            counters,
        }
    }

    /// Snapshot for any state other than `Ok`; carries no sensor values.
    pub fn status(state: SlaveState, timestamp: u64, counters: Counters) -> Self {
        debug_assert!(!state.is_ok(), "an OK snapshot needs sensor values");
        Self {
            state,
            timestamp,
            values: None,
            counters,
        }
    }

    /// Age in seconds at `now`, saturating at zero for timestamps in the future.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Persisted document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub estado: SlaveState,
    pub timestamp_lectura: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potenciometro: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ultrasonido: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boton_1: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boton_2: Option<u16>,
    #[serde(default)]
    pub stats_aceptadas: u64,
    #[serde(default)]
    pub stats_crc: u64,
    #[serde(default)]
    pub stats_no_alcanzado: u64,
    #[serde(default)]
    pub stats_excepcion: u64,
    #[serde(default)]
    pub stats_malformadas: u64,
}

impl From<Snapshot> for SnapshotDocument {
    fn from(snapshot: Snapshot) -> Self {
        let values = snapshot.values;
        Self {
            estado: snapshot.state,
            timestamp_lectura: snapshot.timestamp,
            potenciometro: values.map(|v| v.pot),
            ultrasonido: values.map(|v| v.ultra),
            boton_1: values.map(|v| v.btn1),
            boton_2: values.map(|v| v.btn2),
            stats_aceptadas: snapshot.counters.accepted,
            stats_crc: snapshot.counters.crc_errors,
            stats_no_alcanzado: snapshot.counters.unreachable,
            stats_excepcion: snapshot.counters.exceptions,
            stats_malformadas: snapshot.counters.malformed,
        }
    }
}

impl TryFrom<SnapshotDocument> for Snapshot {
    type Error = Error;

    fn try_from(doc: SnapshotDocument) -> Result<Self, Self::Error> {
        let values = match (doc.potenciometro, doc.ultrasonido, doc.boton_1, doc.boton_2) {
            (Some(pot), Some(ultra), Some(btn1), Some(btn2)) => Some(SensorValues {
                pot,
                ultra,
                btn1,
                btn2,
            }),
            (None, None, None, None) => None,
            _ => return Err(Error::Snapshot("partial sensor values".to_string())),
        };

        if doc.estado.is_ok() != values.is_some() {
            return Err(Error::Snapshot(format!(
                "state {} {} sensor values",
                doc.estado,
                if values.is_some() { "must not carry" } else { "requires" }
            )));
        }

        Ok(Self {
            state: doc.estado,
            timestamp: doc.timestamp_lectura,
            values,
            counters: Counters {
                accepted: doc.stats_aceptadas,
                crc_errors: doc.stats_crc,
                unreachable: doc.stats_no_alcanzado,
                exceptions: doc.stats_excepcion,
                malformed: doc.stats_malformadas,
            },
        })
    }
}

/// Current time in whole seconds since the Unix epoch.
pub fn current_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
