//! Address-space host for rtulink.
//!
//! Watches the snapshot written by the serial master, derives master and
//! slave health from it and hosts the resulting tags as a queryable Zenoh
//! key space under `<prefix>/Dispositivo1/*`.

pub mod config;
pub mod sink;
pub mod tree;
pub mod watcher;

pub use config::{HostConfig, HostSettings};
pub use sink::{HostedTags, TagSink};
pub use tree::{TagTree, serve};
pub use watcher::{WatchSettings, Watcher};
