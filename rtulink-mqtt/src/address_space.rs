//! Client side of the hosted address space.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rtulink_common::{KeyExprBuilder, TagSample, decode_auto, parse_tag_key};
use tracing::{debug, warn};
use zenoh::Session;

use crate::error::{MqttError, Result};

/// Connect-and-browse access to the address-space host.
#[async_trait]
pub trait AddressSpace: Send + Sync {
    /// Fails when the host is not reachable.
    async fn connect(&self) -> Result<()>;

    /// Current value of every tag under the device object.
    async fn browse(&self) -> Result<Vec<TagSample>>;
}

/// Address space reached over Zenoh: the host's liveliness token decides
/// reachability, and a query on the device wildcard is the browse.
#[derive(Debug, Clone)]
pub struct ZenohAddressSpace {
    session: Arc<Session>,
    keys: KeyExprBuilder,
    timeout: Duration,
}

impl ZenohAddressSpace {
    pub fn new(session: Arc<Session>, keys: KeyExprBuilder, timeout: Duration) -> Self {
        Self {
            session,
            keys,
            timeout,
        }
    }
}

#[async_trait]
impl AddressSpace for ZenohAddressSpace {
    async fn connect(&self) -> Result<()> {
        let key = self.keys.alive_key();
        let alive = rtulink_framework::check_alive(&self.session, &key, self.timeout)
            .await
            .map_err(|e| MqttError::Browse(e.to_string()))?;
        if alive {
            Ok(())
        } else {
            Err(MqttError::HostUnreachable(key))
        }
    }

    async fn browse(&self) -> Result<Vec<TagSample>> {
        let selector = self.keys.device_wildcard();
        let replies = self
            .session
            .get(selector.as_str())
            .timeout(self.timeout)
            .await
            .map_err(|e| MqttError::Browse(e.to_string()))?;

        let mut samples = Vec::new();
        while let Ok(reply) = replies.recv_async().await {
            let sample = match reply.result() {
                Ok(sample) => sample,
                Err(err) => {
                    warn!(selector = %selector, error = ?err, "Error reply while browsing");
                    continue;
                }
            };

            let key = sample.key_expr().as_str();
            if parse_tag_key(key).is_none() {
                debug!(key = %key, "Skipping unknown node");
                continue;
            }
            match decode_auto::<TagSample>(&sample.payload().to_bytes()) {
                Ok(tag) => samples.push(tag),
                Err(e) => warn!(key = %key, error = %e, "Undecodable tag value"),
            }
        }

        if samples.is_empty() {
            return Err(MqttError::Browse(format!("no tags under '{}'", selector)));
        }
        samples.sort_by_key(|s| s.tag);
        samples.dedup_by_key(|s| s.tag);
        Ok(samples)
    }
}
