//! Process status reporting.

use serde::{Deserialize, Serialize};

use rtulink_common::ComponentHealth;

use crate::Result;
use crate::publisher::Publisher;

/// Status document a process publishes about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// Process name (e.g., "host").
    pub process: String,
    /// Process version.
    pub version: String,
    /// Current status.
    pub status: ComponentHealth,
    /// RFC 3339 time the status was produced.
    pub since: String,
    /// Additional metadata (process-specific).
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl ProcessStatus {
    pub fn new(
        process: impl Into<String>,
        version: impl Into<String>,
        status: ComponentHealth,
    ) -> Self {
        Self {
            process: process.into(),
            version: version.into(),
            status,
            since: chrono::Utc::now().to_rfc3339(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Create a new status with "running" state.
    pub fn running(process: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(process, version, ComponentHealth::Running)
    }

    /// Create a status with "stopped" state.
    pub fn stopped(process: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(process, version, ComponentHealth::Stopped)
    }

    /// Add metadata to the status.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status to Zenoh.
    ///
    /// Publishes to `{key_prefix}/@/status`.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let key = publisher.keys().status_key();
        publisher.publish_json(&key, self).await
    }
}

/// Helper to publish process status on startup and shutdown.
#[derive(Debug)]
pub struct StatusPublisher {
    publisher: Publisher,
    process: String,
    version: String,
}

impl StatusPublisher {
    /// Create a new status publisher.
    pub fn new(publisher: Publisher, process: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            publisher,
            process: process.into(),
            version: version.into(),
        }
    }

    /// Publish "running" status with optional metadata.
    pub async fn publish_running(&self, metadata: Option<serde_json::Value>) -> Result<()> {
        let mut status = ProcessStatus::running(&self.process, &self.version);
        if let Some(meta) = metadata {
            status = status.with_metadata(meta);
        }
        status.publish(&self.publisher).await
    }

    /// Publish "stopped" status.
    pub async fn publish_stopped(&self) -> Result<()> {
        ProcessStatus::stopped(&self.process, &self.version)
            .publish(&self.publisher)
            .await
    }
}
