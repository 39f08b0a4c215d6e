//! The hosted tag tree.
//!
//! [`TagTree`] holds the latest sample of every node. [`serve`] answers Zenoh
//! queries on `<prefix>/Dispositivo1/*` from it and holds the liveliness
//! token the bridge checks before browsing.

use std::collections::BTreeMap;
use std::sync::Arc;

use rtulink_common::{Format, KeyExprBuilder, Tag, TagSample, encode};
use rtulink_framework::{LivelinessManager, ProcessError, ShutdownSignal};
use tokio::sync::RwLock;
use zenoh::Session;
use zenoh::key_expr::KeyExpr;
use zenoh::query::Query;

/// Latest value of each node, shared between the watcher and the query server.
#[derive(Debug, Clone, Default)]
pub struct TagTree {
    nodes: Arc<RwLock<BTreeMap<Tag, TagSample>>>,
}

impl TagTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, sample: TagSample) {
        self.nodes.write().await.insert(sample.tag, sample);
    }

    pub async fn get(&self, tag: Tag) -> Option<TagSample> {
        self.nodes.read().await.get(&tag).cloned()
    }

    /// Every node that has a value, in tag order.
    pub async fn samples(&self) -> Vec<TagSample> {
        self.nodes.read().await.values().cloned().collect()
    }
}

/// Serve the tree until shutdown.
pub async fn serve(
    session: Arc<Session>,
    keys: KeyExprBuilder,
    tree: TagTree,
    format: Format,
    mut shutdown: ShutdownSignal,
) -> rtulink_framework::Result<()> {
    let selector = keys.device_wildcard();
    let queryable = session
        .declare_queryable(&selector)
        .await
        .map_err(|e| ProcessError::AddressSpace(format!("Failed to declare queryable: {}", e)))?;
    let liveliness = LivelinessManager::declare(&session, keys.alive_key()).await?;

    tracing::info!(key = %selector, "Serving tag tree");

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            query = queryable.recv_async() => match query {
                Ok(query) => answer(&query, &keys, &tree, format).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Queryable closed");
                    break;
                }
            },
        }
    }

    // Observers must see the host leave before its tags go away.
    liveliness.undeclare().await?;
    drop(queryable);
    tracing::info!("Tag tree no longer served");
    Ok(())
}

async fn answer(query: &Query, keys: &KeyExprBuilder, tree: &TagTree, format: Format) {
    let mut replied = 0usize;

    for sample in tree.samples().await {
        let key = match KeyExpr::try_from(keys.tag(sample.tag)) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(tag = %sample.tag, error = %e, "Invalid tag key");
                continue;
            }
        };
        if !query.key_expr().intersects(&key) {
            continue;
        }

        let payload = match encode(&sample, format) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(tag = %sample.tag, error = %e, "Failed to encode tag");
                continue;
            }
        };
        match query.reply(key, payload).await {
            Ok(()) => replied += 1,
            Err(e) => tracing::warn!(tag = %sample.tag, error = %e, "Failed to reply"),
        }
    }

    tracing::debug!(selector = %query.selector(), replied, "Answered query");
}
