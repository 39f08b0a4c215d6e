//! Address-space host.
//!
//! Watches the snapshot written by `rtulink-master`, tracks master and slave
//! health and serves the tag tree to the bridge.

use anyhow::Result;
use rtulink_common::FileSnapshotStore;
use rtulink_framework::{KeyExprBuilder, ProcessArgs, ProcessConfig, ProcessRunner, Publisher};
use rtulink_host::{HostConfig, HostedTags, TagTree, WatchSettings, Watcher, serve};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProcessArgs::parse_with_default("host.json5");
    let config = HostConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = ProcessRunner::new_with_args("host", config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let config = runner.config().clone();
    let settings = &config.host;

    let session = runner
        .connect_zenoh(&config.zenoh)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let keys = KeyExprBuilder::with_prefix(&settings.key_prefix);
    let publisher = Publisher::new(session.clone(), keys.clone(), settings.format);
    let tree = TagTree::new();

    tracing::info!(
        snapshot = %settings.snapshot_path.display(),
        prefix = %settings.key_prefix,
        "Host configured"
    );

    runner.spawn_with_error(
        "tag-tree",
        serve(
            session,
            keys,
            tree.clone(),
            settings.format,
            runner.shutdown_signal(),
        ),
    );

    let watcher = Watcher::new(
        WatchSettings::from(settings),
        FileSnapshotStore::new(&settings.snapshot_path),
        HostedTags::new(tree, publisher.clone()),
        runner.shutdown_signal(),
    );
    runner.spawn("watcher", watcher.run());

    let metadata = serde_json::json!({
        "snapshot_path": settings.snapshot_path.display().to_string(),
        "key_prefix": settings.key_prefix,
        "staleness_secs": settings.staleness_secs,
    });

    runner
        .with_status_publishing(publisher)
        .run_with_metadata(Some(metadata))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
}
