//! Snapshot exchange between the serial master and its readers.
//!
//! A single writer replaces the snapshot atomically; any number of readers
//! poll it on their own cadence. [`FileSnapshotStore`] serializes into a
//! side file and renames it over the canonical path, so a reader sees either
//! the previous document or the new one. [`MemorySnapshotStore`] gives the
//! same contract in-process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// Atomic single-writer/multi-reader snapshot storage.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot.
    fn write(&self, snapshot: &Snapshot) -> Result<()>;

    /// Read the newest complete snapshot. `Ok(None)` means nothing was published yet.
    fn read(&self) -> Result<Option<Snapshot>>;
}

/// What a reader learned from one read attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A complete snapshot.
    Present(Snapshot),
    /// Nothing has been published.
    Absent,
    /// The content could not be read or decoded this time.
    Unreadable,
}

/// Read once from `store`, logging failures instead of propagating them.
pub fn observe(store: &dyn SnapshotStore) -> Observation {
    match store.read() {
        Ok(Some(snapshot)) => Observation::Present(snapshot),
        Ok(None) => Observation::Absent,
        Err(e) => {
            tracing::warn!(error = %e, "Snapshot unreadable, retrying next cycle");
            Observation::Unreadable
        }
    }
}

/// Snapshot store backed by a JSON file replaced via rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    side_path: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store for `path`. The side file sits next to it with a `.tmp` extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let side_path = path.with_extension("tmp");
        Self { path, side_path }
    }

    /// Canonical snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Side file written before the rename.
    pub fn side_path(&self) -> &Path {
        &self.side_path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_vec_pretty(snapshot)?;

        let mut file = fs::File::create(&self.side_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.side_path, &self.path)?;
        Ok(())
    }

    fn read(&self) -> Result<Option<Snapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// In-process snapshot store holding the serialized document.
///
/// Writers swap the shared buffer; readers clone the pointer and decode
/// outside the lock.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    document: Mutex<Option<Arc<[u8]>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored bytes verbatim, bypassing serialization.
    pub fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        *self.lock() = Some(Arc::from(bytes));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<[u8]>>> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_vec(snapshot)?;
        self.put_raw(payload);
        Ok(())
    }

    fn read(&self) -> Result<Option<Snapshot>> {
        let document = self.lock().clone();
        match document {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    fn write(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).write(snapshot)
    }

    fn read(&self) -> Result<Option<Snapshot>> {
        (**self).read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Counters, SensorValues, SlaveState};

    fn sample(timestamp: u64) -> Snapshot {
        Snapshot::ok(
            timestamp,
            SensorValues {
                pot: 100,
                ultra: 20,
                btn1: 0,
                btn2: 1,
            },
            Counters {
                accepted: timestamp,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_file_store_missing_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("datos_modbus.json"));
        assert!(store.read().unwrap().is_none());
        assert_eq!(observe(&store), Observation::Absent);
    }

    #[test]
    fn test_file_store_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("datos_modbus.json"));

        store.write(&sample(1)).unwrap();
        store.write(&sample(2)).unwrap();

        assert_eq!(store.read().unwrap(), Some(sample(2)));
        assert!(!store.side_path().exists());
        assert_eq!(
            store.side_path().file_name().unwrap().to_str(),
            Some("datos_modbus.tmp")
        );
    }

    #[test]
    fn test_file_store_garbage_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("datos_modbus.json"));
        fs::write(store.path(), b"{\"estado\": \"OK\", \"timest").unwrap();

        let err = store.read().unwrap_err();
        assert!(err.is_transient());
        assert_eq!(observe(&store), Observation::Unreadable);
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        assert_eq!(observe(&store), Observation::Absent);

        let snapshot = Snapshot::status(SlaveState::Starting, 7, Counters::default());
        store.write(&snapshot).unwrap();
        assert_eq!(observe(&store), Observation::Present(snapshot));

        store.put_raw(b"not json".to_vec());
        assert_eq!(observe(&store), Observation::Unreadable);
    }
}
