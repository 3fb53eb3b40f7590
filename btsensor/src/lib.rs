//! A library for decoding sensor readings from BLE advertisements which have been relayed as hex
//! strings, such as by an ESP32 gateway publishing to MQTT.

pub mod atc;
pub mod flora;
pub mod hex_codec;

use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),
    #[error("No known signature in payload")]
    Unrecognised,
    #[error("Payload has MiBeacon service data but not the Mi Flora signature")]
    PartialFloraSignature,
    #[error("{format} payload too short: {length} bytes but need {required}")]
    TooShort {
        format: Format,
        length: usize,
        required: usize,
    },
    #[error("Unknown Mi Flora measurement tag {0}")]
    UnknownFloraTag(u8),
}

/// A device format which can be decoded.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Format {
    /// Thermometer running the atc1441 custom firmware.
    Atc,
    /// Mi Flora plant sensor.
    Flora,
}

impl Format {
    /// The device type tag used in published readings and as the device model.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Atc => "ACT_MI_TEMP",
            Self::Flora => "Mi Flora",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// The result of matching an advertisement's hex payload against the known signatures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    Known(Format),
    /// MiBeacon service data without the full Mi Flora signature. Not decoded, but worth logging.
    PartialFlora,
    Unrecognised,
}

/// Works out which decoder applies to the given hex payload. Matching is case-sensitive.
pub fn classify(hex_payload: &str) -> Classification {
    if hex_payload.contains(atc::SIGNATURE) {
        Classification::Known(Format::Atc)
    } else if hex_payload.contains(flora::SIGNATURE) {
        Classification::Known(Format::Flora)
    } else if hex_payload.contains(flora::PARTIAL_SIGNATURE) {
        Classification::PartialFlora
    } else {
        Classification::Unrecognised
    }
}

/// A measured or derived quantity which a reading may carry.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Attribute {
    Temperature,
    Humidity,
    Battery,
    Voltage,
    EquilibriumVaporPressure,
    DewPoint,
    AbsoluteHumidity,
    Illuminance,
    Moisture,
    Conductivity,
}

impl Attribute {
    /// The key under which the attribute is published in JSON state messages.
    pub fn key(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Battery => "battery",
            Self::Voltage => "voltage",
            Self::EquilibriumVaporPressure => "equilibriumVaporPressure",
            Self::DewPoint => "dewPoint",
            Self::AbsoluteHumidity => "absoluteHumidity",
            Self::Illuminance => "illuminance",
            Self::Moisture => "moisture",
            Self::Conductivity => "conductivity",
        }
    }
}

impl Display for Attribute {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
}

impl From<Value> for f64 {
    fn from(value: Value) -> Self {
        match value {
            Value::Integer(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Integer(v) => v.fmt(f),
            Self::Float(v) => v.fmt(f),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reading {
    Atc(atc::SensorReading),
    Flora(flora::SensorReading),
}

impl Reading {
    /// Classifies and decodes the given hex payload.
    pub fn decode(hex_payload: &str) -> Result<Self, DecodeError> {
        match classify(hex_payload) {
            Classification::Known(Format::Atc) => Ok(Self::Atc(atc::SensorReading::decode(
                &hex_codec::decode(hex_payload)?,
            )?)),
            Classification::Known(Format::Flora) => Ok(Self::Flora(
                flora::SensorReading::decode(&hex_codec::decode(hex_payload)?)?,
            )),
            Classification::PartialFlora => Err(DecodeError::PartialFloraSignature),
            Classification::Unrecognised => Err(DecodeError::Unrecognised),
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Self::Atc(_) => Format::Atc,
            Self::Flora(_) => Format::Flora,
        }
    }

    /// Returns every attribute which this reading carries a value for, in a stable order.
    ///
    /// Derived quantities which could not be computed are left out.
    pub fn attributes(&self) -> Vec<(Attribute, Value)> {
        match self {
            Self::Atc(reading) => [
                (Attribute::Temperature, Some(Value::Float(reading.temperature()))),
                (Attribute::Humidity, Some(Value::Integer(reading.humidity.into()))),
                (
                    Attribute::Battery,
                    Some(Value::Integer(reading.battery_percent.into())),
                ),
                (Attribute::Voltage, Some(Value::Float(reading.voltage()))),
                (
                    Attribute::EquilibriumVaporPressure,
                    reading.equilibrium_vapor_pressure.map(Value::Float),
                ),
                (Attribute::DewPoint, reading.dew_point.map(Value::Float)),
                (
                    Attribute::AbsoluteHumidity,
                    reading.absolute_humidity.map(Value::Float),
                ),
            ]
            .into_iter()
            .filter_map(|(attribute, value)| Some((attribute, value?)))
            .collect(),
            Self::Flora(reading) => vec![match *reading {
                flora::SensorReading::Temperature(temperature) => (
                    Attribute::Temperature,
                    Value::Float(f64::from(temperature) / 10.0),
                ),
                flora::SensorReading::Battery(battery) => {
                    (Attribute::Battery, Value::Integer(battery.into()))
                }
                flora::SensorReading::Illuminance(lux) => {
                    (Attribute::Illuminance, Value::Integer(lux.into()))
                }
                flora::SensorReading::Moisture(moisture) => {
                    (Attribute::Moisture, Value::Integer(moisture.into()))
                }
                flora::SensorReading::Conductivity(conductivity) => {
                    (Attribute::Conductivity, Value::Integer(conductivity.into()))
                }
            }],
        }
    }

    /// Returns the value of the given attribute, if this reading carries it.
    pub fn get(&self, attribute: Attribute) -> Option<Value> {
        self.attributes()
            .into_iter()
            .find(|(a, _)| *a == attribute)
            .map(|(_, value)| value)
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Atc(reading) => reading.fmt(f),
            Self::Flora(reading) => reading.fmt(f),
        }
    }
}
