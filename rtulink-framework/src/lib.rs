//! rtulink process framework
//!
//! Common lifecycle plumbing for the rtulink binaries.
//!
//! # Overview
//!
//! This framework provides:
//! - [`ProcessConfig`] trait for configuration loading and validation
//! - [`ProcessRunner`] for managing process lifecycle (startup, shutdown, signal handling)
//! - [`ShutdownSignal`] observed by tasks between units of work
//! - [`Publisher`] for publishing tag samples to Zenoh
//! - [`LivelinessManager`] and [`check_alive`] for presence detection
//! - [`ProcessArgs`] for common CLI argument parsing
//! - [`ProcessStatus`] for standardized status reporting
//!
//! # Example
//!
//! ```ignore
//! use rtulink_framework::{ProcessArgs, ProcessConfig, ProcessRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = ProcessArgs::parse_with_default("host.json5");
//!     let config = HostConfig::load(&args.config)?;
//!
//!     let mut runner = ProcessRunner::new_with_args("host", config, Some(&args))?;
//!     runner.spawn("watcher", watcher(runner.shutdown_signal()));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
pub mod liveliness;
mod publisher;
mod runner;
pub mod shutdown;
mod status;

pub use args::ProcessArgs;
pub use config::ProcessConfig;
pub use error::{ProcessError, Result};
pub use liveliness::{LivelinessManager, check_alive};
pub use publisher::Publisher;
pub use runner::{DEFAULT_SHUTDOWN_GRACE, ProcessRunner};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use status::{ProcessStatus, StatusPublisher};

// Re-export commonly used types from rtulink-common
pub use rtulink_common::{Format, KeyExprBuilder, LoggingConfig, TagSample, TagValue, ZenohConfig};
