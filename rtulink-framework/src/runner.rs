//! Process runner for lifecycle management.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use rtulink_common::{ZenohConfig, connect, init_tracing};

use crate::ProcessArgs;
use crate::config::ProcessConfig;
use crate::error::{ProcessError, Result};
use crate::shutdown::{self, ShutdownSignal, ShutdownTrigger, wait_for_signal};
use crate::status::StatusPublisher;

/// Time tasks get to finish after shutdown is signalled.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runner that manages the lifecycle of an rtulink process.
///
/// Handles:
/// - Logging initialization (with CLI override)
/// - Zenoh connection (optional)
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C / SIGTERM: tasks see the signal, finish
///   their current exchange and publish their terminal status
/// - Status publishing (optional)
///
/// # Example
///
/// ```ignore
/// use rtulink_framework::{ProcessArgs, ProcessConfig, ProcessRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = ProcessArgs::parse_with_default("host.json5");
///     let config = HostConfig::load(&args.config)?;
///
///     let mut runner = ProcessRunner::new_with_args("host", config, Some(&args))?;
///     let shutdown = runner.shutdown_signal();
///     runner.spawn("watcher", async move {
///         // Worker logic here, returning once `shutdown` fires
///     });
///
///     runner.run().await?;
///     Ok(())
/// }
/// ```
pub struct ProcessRunner<C: ProcessConfig> {
    /// Process name for logging and status.
    name: String,
    /// Process version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Shutdown trigger shared with the spawned tasks.
    shutdown: ShutdownTrigger,
    /// Zenoh session, when the process joined the address space.
    session: Option<Arc<zenoh::Session>>,
    /// Status publisher (optional).
    status_publisher: Option<StatusPublisher>,
    /// Spawned tasks.
    tasks: Vec<(String, JoinHandle<()>)>,
    /// Time tasks get to finish after shutdown.
    grace: Duration,
}

impl<C: ProcessConfig> ProcessRunner<C> {
    /// Create a new runner and initialize logging from the config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&ProcessArgs>,
    ) -> Result<Self> {
        let name = name.into();
        let version = env!("CARGO_PKG_VERSION").to_string();

        let level = args.and_then(|a| a.log_level.as_deref());
        let log_config = config.logging().with_level_override(level);
        init_tracing(&log_config).map_err(|e| ProcessError::Logging(e.to_string()))?;

        tracing::info!(process = %name, version = %version, "Starting process");

        let (shutdown, _) = shutdown::channel();

        Ok(Self {
            name,
            version,
            config,
            shutdown,
            session: None,
            status_publisher: None,
            tasks: Vec::new(),
            grace: DEFAULT_SHUTDOWN_GRACE,
        })
    }

    /// Open the Zenoh session. It is closed when [`run`](Self::run) returns.
    pub async fn connect_zenoh(&mut self, zenoh: &ZenohConfig) -> Result<Arc<zenoh::Session>> {
        let session = Arc::new(
            connect(zenoh)
                .await
                .map_err(|e| ProcessError::AddressSpace(e.to_string()))?,
        );

        tracing::info!(zid = %session.zid(), mode = %zenoh.mode.as_str(), "Connected to Zenoh");

        self.session = Some(session.clone());
        Ok(session)
    }

    /// Enable status publishing.
    ///
    /// When enabled, the runner publishes a status document on startup and
    /// after every task has stopped.
    pub fn with_status_publishing(mut self, publisher: crate::Publisher) -> Self {
        self.status_publisher = Some(StatusPublisher::new(publisher, &self.name, &self.version));
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Signal observed by tasks to stop between units of work.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.signal()
    }

    /// Spawn a worker task.
    ///
    /// The task is awaited on shutdown and aborted if it overruns the grace period.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.tasks.push((name.into(), handle));
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// An error is logged and shuts the whole process down.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let trigger = self.shutdown.clone();
        let worker = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %worker, error = %e, "Worker failed");
                trigger.trigger();
            }
        });
        self.tasks.push((name, handle));
    }

    /// Run the process until Ctrl+C / SIGTERM or a task requests shutdown.
    ///
    /// This will:
    /// 1. Publish "running" status (if enabled)
    /// 2. Wait for a shutdown signal
    /// 3. Signal all tasks and wait for them within the grace period
    /// 4. Publish "stopped" status (if enabled)
    /// 5. Close the Zenoh session
    pub async fn run(self) -> Result<()> {
        self.run_with_metadata(None).await
    }

    /// Run the process with custom status metadata.
    pub async fn run_with_metadata(self, metadata: Option<serde_json::Value>) -> Result<()> {
        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_running(metadata).await {
                tracing::warn!(error = %e, "Failed to publish running status");
            }
        }

        tracing::info!(
            process = %self.name,
            tasks = self.tasks.len(),
            "Process running. Press Ctrl+C to stop."
        );

        let mut requested = self.shutdown.signal();
        tokio::select! {
            result = wait_for_signal() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for shutdown signals");
                }
                tracing::info!(process = %self.name, "Received shutdown signal");
            }
            _ = requested.triggered() => {
                tracing::info!(process = %self.name, "Shutdown requested by a worker");
            }
        }

        self.shutdown.trigger();
        drain_tasks(self.tasks, self.grace).await;

        if let Some(ref status_pub) = self.status_publisher {
            if let Err(e) = status_pub.publish_stopped().await {
                tracing::warn!(error = %e, "Failed to publish stopped status");
            }
        }

        if let Some(session) = self.session {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "Error closing Zenoh session");
            }
        }

        tracing::info!(process = %self.name, "Goodbye!");

        Ok(())
    }
}

/// Await every task until `grace` elapses, then abort the stragglers.
async fn drain_tasks(tasks: Vec<(String, JoinHandle<()>)>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    for (name, mut task) in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => tracing::debug!(worker = %name, "Worker stopped"),
            Ok(Err(e)) => tracing::warn!(worker = %name, error = %e, "Worker ended abnormally"),
            Err(_) => {
                tracing::warn!(worker = %name, "Worker did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_cooperative_tasks() {
        let (trigger, mut signal) = shutdown::channel();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let task = tokio::spawn(async move {
            signal.triggered().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });

        trigger.trigger();
        drain_tasks(vec![("cooperative".to_string(), task)], Duration::from_secs(2)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drain_aborts_stragglers() {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let started = tokio::time::Instant::now();
        drain_tasks(vec![("stuck".to_string(), task)], Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
