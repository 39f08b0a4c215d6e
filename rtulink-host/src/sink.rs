//! Where evaluated tags go.

use async_trait::async_trait;
use rtulink_common::TagSample;
use rtulink_framework::Publisher;

use crate::tree::TagTree;

/// Receives every tag update the watcher produces.
#[async_trait]
pub trait TagSink: Send + Sync {
    async fn publish(&self, sample: TagSample) -> rtulink_framework::Result<()>;
}

/// Stores each update in the hosted tree and puts it on Zenoh for live
/// subscribers.
#[derive(Debug, Clone)]
pub struct HostedTags {
    tree: TagTree,
    publisher: Publisher,
}

impl HostedTags {
    pub fn new(tree: TagTree, publisher: Publisher) -> Self {
        Self { tree, publisher }
    }

    pub fn tree(&self) -> &TagTree {
        &self.tree
    }
}

#[async_trait]
impl TagSink for HostedTags {
    async fn publish(&self, sample: TagSample) -> rtulink_framework::Result<()> {
        self.tree.set(sample.clone()).await;
        self.publisher.publish_sample(&sample).await
    }
}
