mod bridge;
mod config;
mod mqtt;

use crate::bridge::Bridge;
use crate::config::{Config, get_mqtt_options, read_sensor_names};
use crate::mqtt::{poll_event_loop, run_bridge};
use futures::FutureExt;
use futures::future::try_join;
use rumqttc::AsyncClient;
use stable_eyre::eyre;
use std::collections::HashMap;
use tokio::task;

// Publishing doesn't wait for space in the request queue, so leave room for a full set of discovery
// messages from several devices at once.
const REQUESTS_CAP: usize = 100;

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    stable_eyre::install()?;
    pretty_env_logger::init();
    color_backtrace::install();

    let config = Config::load()?;
    let sensor_names = match &config.bridge.sensor_names_filename {
        Some(filename) => read_sensor_names(filename)?,
        None => HashMap::new(),
    };

    let mqtt_options = get_mqtt_options(&config.mqtt);
    let (client, event_loop) = AsyncClient::new(mqtt_options, REQUESTS_CAP);
    let subscriptions = vec![
        config.homeassistant.status_topic.clone(),
        format!("{}/#", config.bridge.source_topic),
    ];
    let bridge = Bridge::new(
        &config.bridge,
        &config.homeassistant,
        sensor_names,
        client.clone(),
    );

    let (incoming_tx, incoming_rx) = async_channel::unbounded();
    let mqtt_task = task::spawn(poll_event_loop(
        event_loop,
        client,
        subscriptions,
        config.mqtt.reconnect_interval,
        incoming_tx,
    ));
    let bridge_task = task::spawn(run_bridge(bridge, incoming_rx));

    // Run until either task bombs out.
    try_join(
        mqtt_task.map(|res| -> Result<(), eyre::Report> { Ok(res??) }),
        bridge_task.map(|res| -> Result<(), eyre::Report> { Ok(res??) }),
    )
    .await?;
    Ok(())
}
