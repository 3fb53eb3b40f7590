//! Static tables describing which discovery descriptors each device format gets.

use btsensor::{Attribute, Format};

/// How to render the discovery descriptor for one attribute of a device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DiscoverySpec {
    pub device_class: Option<&'static str>,
    /// Appended to the device name to make the entity name.
    pub name_postfix: &'static str,
    pub attribute: Attribute,
    /// Appended to the attribute in the value template, e.g. `" / 100.0"`.
    pub value_mutator: &'static str,
    pub unit: &'static str,
    /// Decimal places to round to in the value template.
    pub precision: u8,
    pub icon: Option<&'static str>,
    /// Subtopic of the device's state topic which the attribute is published on, if any.
    pub state_topic_suffix: Option<&'static str>,
    /// Whether the attributes template exposes battery and voltage rather than the device type.
    pub extended_attributes: bool,
    /// Whether the descriptor is only published if the reading carries a value for the attribute.
    pub require_value: bool,
}

impl DiscoverySpec {
    const fn atc(
        device_class: Option<&'static str>,
        name_postfix: &'static str,
        attribute: Attribute,
        unit: &'static str,
        precision: u8,
        icon: Option<&'static str>,
    ) -> Self {
        Self {
            device_class,
            name_postfix,
            attribute,
            value_mutator: "",
            unit,
            precision,
            icon,
            state_topic_suffix: None,
            extended_attributes: true,
            require_value: true,
        }
    }

    const fn flora(
        device_class: Option<&'static str>,
        name_postfix: &'static str,
        attribute: Attribute,
        unit: &'static str,
        precision: u8,
        icon: Option<&'static str>,
        state_topic_suffix: Option<&'static str>,
    ) -> Self {
        Self {
            device_class,
            name_postfix,
            attribute,
            value_mutator: "",
            unit,
            precision,
            icon,
            state_topic_suffix,
            extended_attributes: false,
            require_value: false,
        }
    }
}

pub const ATC_SPECS: &[DiscoverySpec] = &[
    DiscoverySpec::atc(
        Some("temperature"),
        "temperature",
        Attribute::Temperature,
        "°C",
        1,
        None,
    ),
    DiscoverySpec::atc(
        Some("humidity"),
        "humidity",
        Attribute::Humidity,
        "%",
        1,
        None,
    ),
    DiscoverySpec::atc(
        Some("voltage"),
        "battery voltage",
        Attribute::Voltage,
        "V",
        3,
        None,
    ),
    DiscoverySpec::atc(
        Some("battery"),
        "battery",
        Attribute::Battery,
        "%",
        0,
        None,
    ),
    DiscoverySpec::atc(
        None,
        "absolute humidity",
        Attribute::AbsoluteHumidity,
        "g/m³",
        2,
        Some("mdi:water"),
    ),
    DiscoverySpec::atc(
        Some("temperature"),
        "dew point",
        Attribute::DewPoint,
        "°C",
        1,
        Some("mdi:water"),
    ),
    DiscoverySpec::atc(
        Some("pressure"),
        "equilibrium vapor pressure",
        Attribute::EquilibriumVaporPressure,
        "Pa",
        1,
        None,
    ),
];

// Mi Flora sends one measurement per advertisement, so every entity is announced up front.
pub const FLORA_SPECS: &[DiscoverySpec] = &[
    DiscoverySpec::flora(
        Some("temperature"),
        "temperature",
        Attribute::Temperature,
        "°C",
        1,
        None,
        Some("temperature"),
    ),
    DiscoverySpec::flora(
        Some("moisture"),
        "moisture",
        Attribute::Moisture,
        "%",
        0,
        Some("mdi:water-percent"),
        Some("moisture"),
    ),
    DiscoverySpec::flora(
        Some("illuminance"),
        "illuminance",
        Attribute::Illuminance,
        "lx",
        0,
        None,
        Some("illuminance"),
    ),
    DiscoverySpec::flora(
        None,
        "conductivity",
        Attribute::Conductivity,
        "µS/cm",
        0,
        Some("mdi:flower"),
        Some("conductivity"),
    ),
    DiscoverySpec::flora(
        Some("battery"),
        "battery",
        Attribute::Battery,
        "%",
        0,
        None,
        None,
    ),
];

/// Returns the discovery specs for every attribute a device of the given format exposes.
pub fn specs_for(format: Format) -> &'static [DiscoverySpec] {
    match format {
        Format::Atc => ATC_SPECS,
        Format::Flora => FLORA_SPECS,
    }
}
