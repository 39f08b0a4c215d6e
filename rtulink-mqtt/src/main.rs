//! Address space to MQTT bridge.
//!
//! Browses the tag tree hosted by `rtulink-host` and mirrors it onto MQTT
//! topics, reporting the host's health and its own.

use anyhow::{Context, Result};
use rtulink_framework::{KeyExprBuilder, ProcessArgs, ProcessConfig, ProcessRunner};
use rtulink_mqtt::bridge::CLIENT_PREFIX;
use rtulink_mqtt::{Bridge, BridgeConfig, MirrorSettings, Topics, ZenohAddressSpace, link};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProcessArgs::parse_with_default("bridge.json5");
    let config = BridgeConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = ProcessRunner::new_with_args("bridge", config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let config = runner.config().clone();

    let settings = MirrorSettings::from_config(&config.bridge).context("Invalid bridge settings")?;
    let (client, eventloop) = link::connect(
        &config.mqtt,
        CLIENT_PREFIX,
        Some(rtulink_mqtt::bridge_last_will()),
    )
    .context("Failed to set up the MQTT client")?;

    let session = runner
        .connect_zenoh(&config.zenoh)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let space = ZenohAddressSpace::new(
        session,
        KeyExprBuilder::with_prefix(&config.bridge.key_prefix),
        config.bridge.browse_timeout(),
    );

    tracing::info!(
        broker = %config.mqtt.broker,
        base = %config.mqtt.topic_base,
        prefix = %config.bridge.key_prefix,
        "Bridge configured"
    );

    let shutdown = runner.shutdown_signal();
    runner.spawn(
        "mqtt-events",
        link::drive(eventloop, shutdown.clone(), settings.reconnect_delay),
    );

    let bridge = Bridge::new(
        space,
        client,
        Topics::new(&config.mqtt.topic_base),
        settings,
        shutdown,
    );
    runner.spawn_with_error("mirror", bridge.run());

    runner.run().await.map_err(|e| anyhow::anyhow!("{}", e))
}
