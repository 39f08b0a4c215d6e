//! Tag publisher for the Zenoh address space.

use std::sync::Arc;

use rtulink_common::{Format, KeyExprBuilder, TagSample, encode};

use crate::error::{ProcessError, Result};

/// Publisher for sending tag samples to Zenoh.
///
/// Wraps a Zenoh session and publishes each [`TagSample`] under
/// `<prefix>/Dispositivo1/<node>` with the configured serialization.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Arc<zenoh::Session>,
    keys: KeyExprBuilder,
    format: Format,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(session: Arc<zenoh::Session>, keys: KeyExprBuilder, format: Format) -> Self {
        Self {
            session,
            keys,
            format,
        }
    }

    /// Key expression builder for this publisher's prefix.
    pub fn keys(&self) -> &KeyExprBuilder {
        &self.keys
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Arc<zenoh::Session> {
        &self.session
    }

    /// Publish one tag sample under its node key.
    pub async fn publish_sample(&self, sample: &TagSample) -> Result<()> {
        let key = self.keys.tag(sample.tag);
        let payload =
            encode(sample, self.format).map_err(|e| ProcessError::Encode(e.to_string()))?;
        self.publish_raw(&key, payload).await
    }

    /// Publish raw bytes to a key (for status messages, etc.).
    pub async fn publish_raw(&self, key: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(key, payload)
            .await
            .map_err(|e| ProcessError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Publish a JSON value to a key.
    pub async fn publish_json<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish_raw(key, payload).await
    }
}
