//! `hass-discovery` generates [Home Assistant MQTT discovery](https://www.home-assistant.io/integrations/mqtt/#mqtt-discovery)
//! configuration for sensor readings decoded by `btsensor`, and keeps track of which devices have
//! already been announced.

mod registry;
mod spec;

pub use crate::registry::DiscoveryRegistry;
pub use crate::spec::{specs_for, DiscoverySpec, ATC_SPECS, FLORA_SPECS};

use btsensor::Reading;
use serde_derive::Serialize;
use std::fmt::{self, Display, Formatter};

const UNIQUE_ID_PREFIX: &str = "xiomi";
const MANUFACTURER: &str = "Xiomi";
const STATE_CLASS: &str = "measurement";

const EXTENDED_ATTRIBUTES_TEMPLATE: &str = r#"{
      "mac": "{{value_json.mac}}",
      "updated": "{{value_json.updated}}",
      "rssi": "{{value_json.rssi}}",
      "battery": "{{value_json.battery}}",
      "voltage": "{{value_json.voltage}}"
    }"#;

const PLAIN_ATTRIBUTES_TEMPLATE: &str = r#"{
      "mac": "{{value_json.mac}}",
      "updated": "{{value_json.updated}}",
      "rssi": "{{value_json.rssi}}",
      "type": "{{value_json.type}}"
    }"#;

/// Strips separators from a MAC address and lower-cases it, for use in IDs and topics.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect::<String>()
        .to_lowercase()
}

/// Returns the topic on which state for the given device (and optional attribute subtopic) is
/// published.
pub fn state_topic(base: &str, normalized_mac: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{base}/{normalized_mac}/{suffix}"),
        None => format!("{base}/{normalized_mac}"),
    }
}

/// A Home Assistant sensor discovery configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DiscoveryDescriptor {
    pub unique_id: String,
    pub object_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    pub state_class: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
    pub value_template: String,
    pub json_attributes_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub unit_of_measurement: String,
    pub device: DeviceInfo,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub identifiers: Vec<String>,
    pub name: String,
}

/// A descriptor along with the topic it should be published to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub descriptor: DiscoveryDescriptor,
}

impl DiscoveryMessage {
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.descriptor)
    }
}

/// Why no descriptor was built for an attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Skipped {
    /// The reading carries no value for the attribute.
    NoValue,
    /// The attribute is not in the configured allow-list.
    NotIncluded,
}

impl Display for Skipped {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::NoValue => f.write_str("not present in reading"),
            Self::NotIncluded => f.write_str("not in included attributes"),
        }
    }
}

/// The device a reading came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DeviceIdentity<'a> {
    /// MAC address as it appeared in the topic.
    pub mac: &'a str,
    /// Human-readable name, if one is configured.
    pub name: Option<&'a str>,
}

/// Builds discovery descriptors according to the bridge's topic configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DescriptorBuilder {
    discovery_prefix: String,
    object_id_prefix: String,
    state_topic_base: String,
    /// If non-empty, only these attributes get descriptors.
    include_attributes: Vec<String>,
}

impl DescriptorBuilder {
    /// # Arguments
    /// * `discovery_prefix`: Home Assistant's discovery topic prefix, usually "homeassistant".
    /// * `object_id_prefix`: Prepended (with an underscore) to object IDs if non-empty.
    /// * `state_topic_base`: Base topic under which readings are published.
    /// * `include_attributes`: Attribute keys to restrict discovery to, or empty for all.
    pub fn new(
        discovery_prefix: &str,
        object_id_prefix: &str,
        state_topic_base: &str,
        include_attributes: Vec<String>,
    ) -> Self {
        Self {
            discovery_prefix: discovery_prefix.to_owned(),
            object_id_prefix: object_id_prefix.to_owned(),
            state_topic_base: state_topic_base.to_owned(),
            include_attributes,
        }
    }

    /// Builds the descriptor for one attribute of the given reading, unless it should be skipped.
    pub fn build(
        &self,
        device: DeviceIdentity,
        reading: &Reading,
        spec: &DiscoverySpec,
    ) -> Result<DiscoveryMessage, Skipped> {
        let key = spec.attribute.key();
        if spec.require_value && reading.get(spec.attribute).is_none() {
            return Err(Skipped::NoValue);
        }
        if !self.include_attributes.is_empty()
            && !self.include_attributes.iter().any(|a| a == key)
        {
            return Err(Skipped::NotIncluded);
        }

        let mac = normalize_mac(device.mac);
        let object_id = if self.object_id_prefix.is_empty() {
            format!("{mac}_{key}")
        } else {
            format!("{}_{mac}_{key}", self.object_id_prefix)
        };
        let topic = format!("{}/sensor/{object_id}/config", self.discovery_prefix);
        let state_topic = state_topic(&self.state_topic_base, &mac, spec.state_topic_suffix);
        let (device_name, name) = match device.name {
            Some(name) if !name.is_empty() => {
                (name.to_owned(), format!("{name} {}", spec.name_postfix))
            }
            _ => (
                format!("Xiomi sensor {}", mac_tail(&mac)),
                spec.name_postfix.to_owned(),
            ),
        };
        let json_attributes_template = if spec.extended_attributes {
            EXTENDED_ATTRIBUTES_TEMPLATE
        } else {
            PLAIN_ATTRIBUTES_TEMPLATE
        };

        let descriptor = DiscoveryDescriptor {
            unique_id: format!("{UNIQUE_ID_PREFIX}_{mac}_{key}"),
            object_id,
            name,
            device_class: spec.device_class.map(ToOwned::to_owned),
            state_class: STATE_CLASS.to_owned(),
            json_attributes_topic: state_topic.clone(),
            state_topic,
            value_template: format!(
                "{{{{ value_json.{key}{} | float | round({}) }}}}",
                spec.value_mutator, spec.precision
            ),
            json_attributes_template: json_attributes_template.to_owned(),
            icon: spec.icon.map(ToOwned::to_owned),
            unit_of_measurement: spec.unit.to_owned(),
            device: DeviceInfo {
                manufacturer: MANUFACTURER.to_owned(),
                model: reading.format().type_tag().to_owned(),
                identifiers: vec![mac],
                name: device_name,
            },
        };
        Ok(DiscoveryMessage { topic, descriptor })
    }

    /// Builds descriptors for every applicable attribute of the device the reading came from.
    pub fn build_all(&self, device: DeviceIdentity, reading: &Reading) -> Vec<DiscoveryMessage> {
        specs_for(reading.format())
            .iter()
            .filter_map(|spec| match self.build(device, reading, spec) {
                Ok(message) => Some(message),
                Err(reason) => {
                    log::debug!(
                        "{} {} for {}, skipping discovery",
                        spec.attribute,
                        reason,
                        device.mac
                    );
                    None
                }
            })
            .collect()
    }

    /// Returns the topic which the given reading's state should be published on.
    pub fn state_topic_for(&self, mac: &str, reading: &Reading) -> String {
        let suffix = specs_for(reading.format())
            .iter()
            .find(|spec| reading.get(spec.attribute).is_some())
            .and_then(|spec| spec.state_topic_suffix);
        state_topic(&self.state_topic_base, &normalize_mac(mac), suffix)
    }
}

/// The last 6 characters of a normalised MAC address.
fn mac_tail(mac: &str) -> &str {
    let start = mac.char_indices().rev().nth(5).map_or(0, |(i, _)| i);
    &mac[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use btsensor::Attribute;
    use serde_json::json;

    const ATC_PAYLOAD: &str = "10161A18A4C1388C419300D2375A0BB82C";
    const FLORA_MOISTURE_PAYLOAD: &str =
        "020106030395FE131695FE712098005EF6AB8D7CC4800D0810012A";
    const MAC: &str = "A4:C1:38:8C:41:93";

    fn builder() -> DescriptorBuilder {
        DescriptorBuilder::new("homeassistant", "", "xiomi", vec![])
    }

    fn device() -> DeviceIdentity<'static> {
        DeviceIdentity {
            mac: MAC,
            name: None,
        }
    }

    fn spec(specs: &[DiscoverySpec], attribute: Attribute) -> DiscoverySpec {
        *specs
            .iter()
            .find(|spec| spec.attribute == attribute)
            .unwrap()
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_mac("A4:C1:38:8C:41:93"), "a4c1388c4193");
        assert_eq!(normalize_mac("a4-c1-38-8c-41-93"), "a4c1388c4193");
        assert_eq!(normalize_mac("A4C1388C4193"), "a4c1388c4193");
    }

    #[test]
    fn tail() {
        assert_eq!(mac_tail("a4c1388c4193"), "8c4193");
        assert_eq!(mac_tail("4193"), "4193");
        assert_eq!(mac_tail("ééééééé"), "éééééé");
    }

    #[test]
    fn atc_temperature_descriptor() {
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        let message = builder()
            .build(device(), &reading, &spec(ATC_SPECS, Attribute::Temperature))
            .unwrap();
        assert_eq!(
            message.topic,
            "homeassistant/sensor/a4c1388c4193_temperature/config"
        );
        let payload: serde_json::Value =
            serde_json::from_str(&message.payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "unique_id": "xiomi_a4c1388c4193_temperature",
                "object_id": "a4c1388c4193_temperature",
                "name": "temperature",
                "device_class": "temperature",
                "state_class": "measurement",
                "state_topic": "xiomi/a4c1388c4193",
                "json_attributes_topic": "xiomi/a4c1388c4193",
                "value_template": "{{ value_json.temperature | float | round(1) }}",
                "json_attributes_template": EXTENDED_ATTRIBUTES_TEMPLATE,
                "unit_of_measurement": "°C",
                "device": {
                    "manufacturer": "Xiomi",
                    "model": "ACT_MI_TEMP",
                    "identifiers": ["a4c1388c4193"],
                    "name": "Xiomi sensor 8c4193",
                },
            })
        );
    }

    #[test]
    fn optional_fields_omitted() {
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        let message = builder()
            .build(
                device(),
                &reading,
                &spec(ATC_SPECS, Attribute::AbsoluteHumidity),
            )
            .unwrap();
        let payload = message.payload().unwrap();
        assert!(!payload.contains("device_class"));
        assert!(payload.contains(r#""icon":"mdi:water""#));

        let message = builder()
            .build(device(), &reading, &spec(ATC_SPECS, Attribute::Battery))
            .unwrap();
        assert!(!message.payload().unwrap().contains("icon"));
    }

    #[test]
    fn configured_names_and_prefix() {
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        let builder = DescriptorBuilder::new("ha", "garden", "sensors", vec![]);
        let message = builder
            .build(
                DeviceIdentity {
                    mac: MAC,
                    name: Some("Greenhouse"),
                },
                &reading,
                &spec(ATC_SPECS, Attribute::DewPoint),
            )
            .unwrap();
        assert_eq!(message.topic, "ha/sensor/garden_a4c1388c4193_dewPoint/config");
        let descriptor = message.descriptor;
        assert_eq!(descriptor.unique_id, "xiomi_a4c1388c4193_dewPoint");
        assert_eq!(descriptor.object_id, "garden_a4c1388c4193_dewPoint");
        assert_eq!(descriptor.name, "Greenhouse dew point");
        assert_eq!(descriptor.device.name, "Greenhouse");
        assert_eq!(descriptor.state_topic, "sensors/a4c1388c4193");
    }

    #[test]
    fn atc_missing_value_skipped() {
        // 0% humidity, so no dew point can be derived.
        let reading = Reading::decode("10161A18A4C1388C419300D2005A0BB82C").unwrap();
        assert_eq!(
            builder().build(device(), &reading, &spec(ATC_SPECS, Attribute::DewPoint)),
            Err(Skipped::NoValue)
        );
        let messages = builder().build_all(device(), &reading);
        assert_eq!(messages.len(), ATC_SPECS.len() - 1);
        assert!(messages
            .iter()
            .all(|message| !message.topic.contains("dewPoint")));
    }

    #[test]
    fn zero_battery_still_announced() {
        let reading = Reading::decode("10161A18A4C1388C419300D237000BB82C").unwrap();
        assert!(builder()
            .build(device(), &reading, &spec(ATC_SPECS, Attribute::Battery))
            .is_ok());
    }

    #[test]
    fn atc_build_all() {
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        let topics: Vec<_> = builder()
            .build_all(device(), &reading)
            .into_iter()
            .map(|message| message.topic)
            .collect();
        assert_eq!(
            topics,
            vec![
                "homeassistant/sensor/a4c1388c4193_temperature/config",
                "homeassistant/sensor/a4c1388c4193_humidity/config",
                "homeassistant/sensor/a4c1388c4193_voltage/config",
                "homeassistant/sensor/a4c1388c4193_battery/config",
                "homeassistant/sensor/a4c1388c4193_absoluteHumidity/config",
                "homeassistant/sensor/a4c1388c4193_dewPoint/config",
                "homeassistant/sensor/a4c1388c4193_equilibriumVaporPressure/config",
            ]
        );
    }

    #[test]
    fn flora_announces_every_attribute() {
        let reading = Reading::decode(FLORA_MOISTURE_PAYLOAD).unwrap();
        let device = DeviceIdentity {
            mac: "C4:7C:8D:6A:F6:AB",
            name: None,
        };
        let messages = builder().build_all(device, &reading);
        let state_topics: Vec<_> = messages
            .iter()
            .map(|message| message.descriptor.state_topic.as_str())
            .collect();
        assert_eq!(
            state_topics,
            vec![
                "xiomi/c47c8d6af6ab/temperature",
                "xiomi/c47c8d6af6ab/moisture",
                "xiomi/c47c8d6af6ab/illuminance",
                "xiomi/c47c8d6af6ab/conductivity",
                "xiomi/c47c8d6af6ab",
            ]
        );
        for message in &messages {
            assert_eq!(message.descriptor.device.model, "Mi Flora");
            assert_eq!(
                message.descriptor.json_attributes_template,
                PLAIN_ATTRIBUTES_TEMPLATE
            );
        }
    }

    #[test]
    fn allow_list_restricts_both_formats() {
        let builder =
            DescriptorBuilder::new("homeassistant", "", "xiomi", vec!["temperature".to_owned()]);
        for payload in [ATC_PAYLOAD, FLORA_MOISTURE_PAYLOAD] {
            let reading = Reading::decode(payload).unwrap();
            let messages = builder.build_all(device(), &reading);
            assert_eq!(messages.len(), 1);
            assert_eq!(
                messages[0].descriptor.unique_id,
                "xiomi_a4c1388c4193_temperature"
            );
        }
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        assert_eq!(
            builder.build(device(), &reading, &spec(ATC_SPECS, Attribute::Humidity)),
            Err(Skipped::NotIncluded)
        );
    }

    #[test]
    fn deterministic() {
        let reading = Reading::decode(ATC_PAYLOAD).unwrap();
        let first: Vec<_> = builder()
            .build_all(device(), &reading)
            .iter()
            .map(|message| message.payload().unwrap())
            .collect();
        let second: Vec<_> = builder()
            .build_all(device(), &reading)
            .iter()
            .map(|message| message.payload().unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn state_topic_follows_attribute() {
        let atc = Reading::decode(ATC_PAYLOAD).unwrap();
        assert_eq!(builder().state_topic_for(MAC, &atc), "xiomi/a4c1388c4193");
        let flora = Reading::decode(FLORA_MOISTURE_PAYLOAD).unwrap();
        assert_eq!(
            builder().state_topic_for(MAC, &flora),
            "xiomi/a4c1388c4193/moisture"
        );
        let battery =
            Reading::decode("020106030395FE131695FE712098005EF6AB8D7CC4800D0510015F").unwrap();
        assert_eq!(
            builder().state_topic_for(MAC, &battery),
            "xiomi/a4c1388c4193"
        );
    }
}
