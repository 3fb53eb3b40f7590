use crate::bridge::{Bridge, Publisher};
use async_channel::{Receiver, Sender};
use eyre::{Report, eyre};
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, Incoming, Publish, QoS};
use std::time::Duration;
use tokio::time::sleep;

impl Publisher for AsyncClient {
    type Error = ClientError;

    fn publish(&mut self, topic: &str, payload: String, retain: bool) -> Result<(), ClientError> {
        self.try_publish(topic, QoS::AtLeastOnce, retain, payload)
    }
}

/// Polls the MQTT event loop, subscribing whenever a connection is established and forwarding
/// incoming publishes to the bridge.
///
/// Connection errors are logged, and polling resumes after `reconnect_interval`.
pub async fn poll_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    reconnect_interval: Duration,
    incoming_tx: Sender<Publish>,
) -> Result<(), Report> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                log::info!("MQTT connection established");
                subscribe_all(&client, &subscriptions);
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                log::trace!("Message received on {}", publish.topic);
                incoming_tx
                    .send(publish)
                    .await
                    .map_err(|_| eyre!("Incoming message channel receiver closed."))?;
            }
            Ok(notification) => log::trace!("Notification = {notification:?}"),
            Err(e) => {
                log::error!("Unable to connect to MQTT broker: {e}");
                sleep(reconnect_interval).await;
            }
        }
    }
}

/// Requests a subscription to each of the given topics, returning how many were queued. Failures
/// are only logged.
fn subscribe_all(client: &AsyncClient, subscriptions: &[String]) -> usize {
    let mut subscribed = 0;
    for topic in subscriptions {
        log::trace!("Subscribe to {topic}");
        match client.try_subscribe(topic, QoS::AtLeastOnce) {
            Ok(()) => subscribed += 1,
            Err(e) => log::error!("Failed to subscribe to {topic}: {e}"),
        }
    }
    subscribed
}

/// Handles incoming publishes one at a time, in the order they arrived.
pub async fn run_bridge<P: Publisher>(
    mut bridge: Bridge<P>,
    incoming_rx: Receiver<Publish>,
) -> Result<(), Report> {
    loop {
        let publish = incoming_rx
            .recv()
            .await
            .map_err(|_| eyre!("Incoming message channel sender closed."))?;
        bridge.handle_message(&publish.topic, &publish.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::MqttOptions;

    #[test]
    fn full_request_queue_does_not_stop_subscribing() {
        let options = MqttOptions::new("mijia-hass-test", "localhost", 1883);
        let (client, _event_loop) = AsyncClient::new(options, 1);
        let subscriptions = vec!["homeassistant/status".to_owned(), "ruuvi/#".to_owned()];
        assert_eq!(subscribe_all(&client, &subscriptions), 1);
    }
}
