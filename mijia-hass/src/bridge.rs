use crate::config::{BridgeConfig, HomeAssistantConfig};
use btsensor::{DecodeError, Reading, Value};
use hass_discovery::{DescriptorBuilder, DeviceIdentity, DiscoveryRegistry, normalize_mac};
use serde_derive::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::fmt::Display;

/// Somewhere to send MQTT messages to without waiting for them to be delivered.
pub trait Publisher {
    type Error: Display;

    fn publish(&mut self, topic: &str, payload: String, retain: bool) -> Result<(), Self::Error>;
}

/// An advertisement relayed by a BLE gateway.
#[derive(Clone, Debug, Deserialize)]
struct Advertisement {
    /// Raw advertisement payload as hex.
    data: Option<String>,
    #[serde(default)]
    rssi: JsonValue,
    #[serde(default)]
    ts: JsonValue,
}

/// Turns relayed advertisements into decoded readings and Home Assistant discovery configuration.
#[derive(Debug)]
pub struct Bridge<P> {
    status_topic: String,
    descriptors: DescriptorBuilder,
    registry: DiscoveryRegistry,
    /// Sensor names keyed by normalised MAC address.
    sensor_names: HashMap<String, String>,
    publisher: P,
}

impl<P: Publisher> Bridge<P> {
    pub fn new(
        bridge: &BridgeConfig,
        homeassistant: &HomeAssistantConfig,
        sensor_names: HashMap<String, String>,
        publisher: P,
    ) -> Self {
        Self {
            status_topic: homeassistant.status_topic.clone(),
            descriptors: DescriptorBuilder::new(
                &homeassistant.discovery_prefix,
                &homeassistant.object_id_prefix,
                &bridge.state_topic,
                homeassistant.attributes.clone(),
            ),
            registry: DiscoveryRegistry::new(),
            sensor_names,
            publisher,
        }
    }

    /// Handles one incoming MQTT message. Anything which can't be decoded is logged and dropped.
    pub fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        if topic == self.status_topic {
            log::info!(
                "Home Assistant status {:?}, forgetting {} discovered devices",
                String::from_utf8_lossy(payload),
                self.registry.len()
            );
            self.registry.reset();
            return;
        }

        let advertisement: Advertisement = match serde_json::from_slice(payload) {
            Ok(advertisement) => advertisement,
            Err(e) => {
                log::trace!("Ignoring unparsable message on {topic}: {e}");
                return;
            }
        };
        let Some(data) = &advertisement.data else {
            return;
        };
        let mac = topic.rsplit_once('/').map_or(topic, |(_, mac)| mac);
        if mac.is_empty() {
            log::debug!("No MAC address in topic {topic}");
            return;
        }

        match Reading::decode(data) {
            Ok(reading) => self.publish_reading(mac, &advertisement, data, &reading),
            Err(e) => log_decode_error(mac, data, &e),
        }
    }

    fn publish_reading(
        &mut self,
        mac: &str,
        advertisement: &Advertisement,
        data: &str,
        reading: &Reading,
    ) {
        let normalized_mac = normalize_mac(mac);
        let name = self.sensor_names.get(&normalized_mac).cloned();
        println!("{} {} ({})", mac, reading, name.as_deref().unwrap_or("unnamed"));

        if self.registry.mark_discovered(&normalized_mac) {
            let device = DeviceIdentity {
                mac,
                name: name.as_deref(),
            };
            let mut announced = true;
            for message in self.descriptors.build_all(device, reading) {
                match message.payload() {
                    Ok(payload) => {
                        log::info!("Publishing to {} discovery: {}", message.topic, payload);
                        announced &= self.publish(&message.topic, payload);
                    }
                    Err(e) => {
                        log::warn!("Failed to serialise discovery for {mac}: {e}");
                        announced = false;
                    }
                }
            }
            if !announced {
                log::warn!("Discovery for {mac} incomplete, will retry on its next reading");
                self.registry.forget(&normalized_mac);
            }
        }

        let topic = self.descriptors.state_topic_for(mac, reading);
        let state = state_message(mac, name.as_deref(), advertisement, data, reading);
        log::debug!("Publishing to {topic} data: {state}");
        self.publish(&topic, state.to_string());
    }

    /// Publishes a retained message, returning whether it was accepted.
    fn publish(&mut self, topic: &str, payload: String) -> bool {
        match self.publisher.publish(topic, payload, true) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to publish to {topic}: {e}");
                false
            }
        }
    }
}

/// Builds the JSON state for a reading, with every attribute it carries plus metadata about the
/// advertisement.
fn state_message(
    mac: &str,
    name: Option<&str>,
    advertisement: &Advertisement,
    data: &str,
    reading: &Reading,
) -> JsonValue {
    let mut state = Map::new();
    for (attribute, value) in reading.attributes() {
        let value = match value {
            Value::Integer(v) => JsonValue::from(v),
            Value::Float(v) => JsonValue::from(v),
        };
        state.insert(attribute.key().to_owned(), value);
    }
    state.insert("mac".to_owned(), mac.into());
    if let Some(name) = name {
        state.insert("name".to_owned(), name.into());
    }
    state.insert("rssi".to_owned(), advertisement.rssi.clone());
    state.insert("type".to_owned(), reading.format().type_tag().into());
    state.insert("updated".to_owned(), advertisement.ts.clone());
    state.insert("data".to_owned(), data.into());
    JsonValue::Object(state)
}

fn log_decode_error(mac: &str, data: &str, error: &DecodeError) {
    match error {
        DecodeError::Unrecognised => log::trace!("{mac}: unrecognised payload {data}"),
        DecodeError::PartialFloraSignature => {
            log::debug!("{mac}: possible Mi Flora payload without full signature {data}")
        }
        DecodeError::UnknownFloraTag(tag) => {
            log::warn!("{mac}: unknown Mi Flora tag {tag} in payload {data}")
        }
        DecodeError::InvalidHex(_) | DecodeError::TooShort { .. } => {
            log::warn!("{mac}: {error} in payload {data}")
        }
    }
}
