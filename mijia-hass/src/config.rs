use eyre::Report;
use hass_discovery::normalize_mac;
use rumqttc::{MqttOptions, Transport};
use rustls::{ClientConfig, RootCertStore};
use serde::{Deserialize as _, Deserializer};
use serde_derive::Deserialize;
use stable_eyre::eyre::WrapErr;
use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

const DEFAULT_HOST: &str = "test.mosquitto.org";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CLIENT_NAME: &str = "mijia-hass";
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SOURCE_TOPIC: &str = "ruuvi";
const DEFAULT_STATE_TOPIC: &str = "xiomi";
const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
const DEFAULT_STATUS_TOPIC: &str = "homeassistant/status";
const CONFIG_FILENAME: &str = "mijia-hass.toml";
const KEEP_ALIVE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub bridge: BridgeConfig,
    pub homeassistant: HomeAssistantConfig,
}

impl Config {
    /// Reads the config file if there is one, then applies any overrides from environment
    /// variables.
    pub fn load() -> Result<Config, Report> {
        let mut config = if Path::new(CONFIG_FILENAME).exists() {
            Config::read(CONFIG_FILENAME)?
        } else {
            log::info!("No {CONFIG_FILENAME}, using defaults");
            Config::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(filename: &str) -> Result<Config, Report> {
        let config_file =
            read_to_string(filename).wrap_err_with(|| format!("Reading {filename}"))?;
        Ok(toml::from_str(&config_file)?)
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), Report> {
        if let Some(host) = var("MQTTHOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = var("MQTTPORT") {
            self.mqtt.port = port
                .parse::<u16>()
                .wrap_err_with(|| format!("Invalid MQTTPORT '{port}'"))?;
        }
        if let Some(username) = var("MQTTUSER") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = var("MQTTPASS") {
            self.mqtt.password = Some(password);
        }
        if let Some(state_topic) = var("XIOMITOPIC") {
            self.bridge.state_topic = state_topic;
        }
        if let Some(source_topic) = var("RUUVITOPIC") {
            self.bridge.source_topic = source_topic;
        }
        if let Some(discovery_prefix) = var("HASSTOPICPREFIX") {
            self.homeassistant.discovery_prefix = discovery_prefix;
        }
        if let Some(status_topic) = var("HASSTOPIC") {
            self.homeassistant.status_topic = status_topic;
        }
        if let Some(object_id_prefix) = var("OBJECTIDPREFIX") {
            self.homeassistant.object_id_prefix = object_id_prefix;
        }
        if let Some(attributes) = var("ATTRIBUTES") {
            self.homeassistant.attributes = parse_attribute_list(&attributes);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_name: String,
    /// How long to wait before polling again after a connection error.
    #[serde(
        deserialize_with = "de_duration_seconds",
        rename = "reconnect_interval_seconds"
    )]
    pub reconnect_interval: Duration,
}

impl Default for MqttConfig {
    fn default() -> MqttConfig {
        MqttConfig {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            use_tls: false,
            username: None,
            password: None,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Base topic which the BLE gateway publishes advertisements under, one subtopic per MAC.
    pub source_topic: String,
    /// Base topic to publish decoded readings under.
    pub state_topic: String,
    pub sensor_names_filename: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeConfig {
            source_topic: DEFAULT_SOURCE_TOPIC.to_owned(),
            state_topic: DEFAULT_STATE_TOPIC.to_owned(),
            sensor_names_filename: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HomeAssistantConfig {
    pub discovery_prefix: String,
    /// Topic on which Home Assistant announces that it has (re)started.
    pub status_topic: String,
    pub object_id_prefix: String,
    /// Attributes to publish discovery configuration for. Empty means all of them.
    pub attributes: Vec<String>,
}

impl Default for HomeAssistantConfig {
    fn default() -> HomeAssistantConfig {
        HomeAssistantConfig {
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_owned(),
            status_topic: DEFAULT_STATUS_TOPIC.to_owned(),
            object_id_prefix: String::new(),
            attributes: vec![],
        }
    }
}

pub fn de_duration_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let seconds = u64::deserialize(d)?;
    Ok(Duration::from_secs(seconds))
}

fn parse_attribute_list(attributes: &str) -> Vec<String> {
    attributes
        .split(',')
        .map(str::trim)
        .filter(|attribute| !attribute.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Construct the `MqttOptions` for connecting to the MQTT broker based on configuration options or
/// defaults.
pub fn get_mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut mqtt_options =
        MqttOptions::new(config.client_name.as_str(), config.host.as_str(), config.port);

    mqtt_options.set_keep_alive(KEEP_ALIVE);
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        mqtt_options.set_credentials(username.as_str(), password.as_str());
    }

    if config.use_tls {
        let certificates = rustls_native_certs::load_native_certs();
        for error in &certificates.errors {
            log::warn!("Failed to load platform certificate: {error}");
        }
        let mut root_store = RootCertStore::empty();
        root_store.add_parsable_certificates(certificates.certs);
        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        mqtt_options.set_transport(Transport::tls_with_config(client_config.into()));
    }
    mqtt_options
}

/// Reads a TOML file mapping MAC addresses to sensor names, keyed by normalised MAC address.
pub fn read_sensor_names(filename: &str) -> Result<HashMap<String, String>, Report> {
    let sensor_names_file =
        read_to_string(filename).wrap_err_with(|| format!("Reading {filename}"))?;
    parse_sensor_names(&sensor_names_file)
}

fn parse_sensor_names(sensor_names: &str) -> Result<HashMap<String, String>, Report> {
    Ok(toml::from_str::<HashMap<String, String>>(sensor_names)?
        .into_iter()
        .map(|(mac_address, name)| (normalize_mac(&mac_address), name))
        .collect())
}
