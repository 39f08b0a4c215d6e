//! Modbus RTU serial master.
//!
//! Polls the slave over the serial line, executes commands received over
//! MQTT and publishes the snapshot read by `rtulink-host`.

use anyhow::{Context, Result};
use rtulink_common::FileSnapshotStore;
use rtulink_framework::{ProcessArgs, ProcessConfig, ProcessRunner};
use rtulink_master::intake::{CLIENT_PREFIX, CommandIntake};
use rtulink_master::{
    Master, MasterConfig, PollSettings, SerialConnector, command_queue, publish_stopped,
};
use rtulink_mqtt::Topics;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ProcessArgs::parse_with_default("master.json5");
    let config = MasterConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;

    let mut runner = ProcessRunner::new_with_args("master", config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let config = runner.config().clone();

    let (sender, commands) = command_queue(config.commands.queue_capacity);
    let store = FileSnapshotStore::new(&config.master.snapshot_path);

    match &config.mqtt {
        Some(mqtt) => {
            let (client, eventloop) = match rtulink_mqtt::link::connect(mqtt, CLIENT_PREFIX, None) {
                Ok(link) => link,
                Err(e) => {
                    publish_stopped(&store);
                    return Err(e).context("Failed to set up the MQTT client");
                }
            };
            let intake = CommandIntake::new(
                client,
                eventloop,
                Topics::new(&mqtt.topic_base),
                config.commands.clone(),
                sender,
                config.master.reconnect_delay(),
            );
            let shutdown = runner.shutdown_signal();
            runner.spawn_with_error("intake", intake.run(shutdown));
        }
        None => {
            info!("No mqtt section configured, command intake disabled");
            drop(sender);
        }
    }

    info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        slave = config.serial.slave_id,
        snapshot = %config.master.snapshot_path.display(),
        "Master configured"
    );

    let master = Master::new(
        PollSettings::from(&config),
        SerialConnector::new(config.serial.clone()),
        store,
        commands,
        runner.shutdown_signal(),
    );
    runner.spawn("poll", async move {
        master.run().await;
    });

    runner.run().await.map_err(|e| anyhow::anyhow!("{}", e))
}
