//! Support for the
//! [atc1441 custom firmware](https://github.com/atc1441/ATC_MiThermometer#advertising-format-of-the-custom-firmware)
//! advertisement as relayed in full, with derived psychrometric quantities.

use crate::{DecodeError, Format};
use std::fmt::{self, Display, Formatter};

/// Service data header (length 0x10, type 0x16, UUID 0x181a) followed by the start of the
/// `A4:C1:38` MAC prefix which the flashed thermometers use.
pub const SIGNATURE: &str = "10161A18A4C";

const TEMPERATURE_OFFSET: usize = 10;
const HUMIDITY_OFFSET: usize = 12;
const BATTERY_OFFSET: usize = 13;
const VOLTAGE_OFFSET: usize = 14;
const MIN_LENGTH: usize = VOLTAGE_OFFSET + 2;

/// Number of decimal places the derived quantities are rounded to.
const DERIVED_PRECISION: i32 = 3;

/// A temperature/humidity reading from a thermometer running the atc1441 firmware.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    /// Temperature in tenths of a degree Celsius.
    pub temperature: i16,
    /// Relative humidity as a percentage.
    pub humidity: u8,
    pub battery_percent: u8,
    pub battery_mv: u16,
    /// Equilibrium vapor pressure in Pa, or `None` if it could not be derived.
    pub equilibrium_vapor_pressure: Option<f64>,
    /// Dew point in °C, or `None` if it could not be derived.
    pub dew_point: Option<f64>,
    /// Absolute humidity in g/m³, or `None` if it could not be derived.
    pub absolute_humidity: Option<f64>,
}

impl SensorReading {
    /// Decodes the full advertisement bytes of a payload which has already been matched against
    /// [`SIGNATURE`].
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < MIN_LENGTH {
            return Err(DecodeError::TooShort {
                format: Format::Atc,
                length: data.len(),
                required: MIN_LENGTH,
            });
        }
        let temperature =
            i16::from_be_bytes([data[TEMPERATURE_OFFSET], data[TEMPERATURE_OFFSET + 1]]);
        let humidity = data[HUMIDITY_OFFSET];
        let derived = Psychrometrics::new(f64::from(temperature) / 10.0, humidity.into());
        Ok(Self {
            temperature,
            humidity,
            battery_percent: data[BATTERY_OFFSET],
            battery_mv: u16::from_be_bytes([data[VOLTAGE_OFFSET], data[VOLTAGE_OFFSET + 1]]),
            equilibrium_vapor_pressure: derived.equilibrium_vapor_pressure,
            dew_point: derived.dew_point,
            absolute_humidity: derived.absolute_humidity,
        })
    }

    /// Returns the temperature reading in °C.
    pub fn temperature(&self) -> f64 {
        f64::from(self.temperature) / 10.0
    }

    /// Returns the battery voltage in V.
    pub fn voltage(&self) -> f64 {
        f64::from(self.battery_mv) / 1000.0
    }
}

impl Display for SensorReading {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:0.1}°C, {}% humidity, {}%/{}mV battery",
            self.temperature(),
            self.humidity,
            self.battery_percent,
            self.battery_mv
        )?;
        if let Some(dew_point) = self.dew_point {
            write!(f, ", dew point {dew_point}°C")?;
        }
        Ok(())
    }
}

/// Quantities derived from temperature and relative humidity with the Magnus approximation.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Psychrometrics {
    equilibrium_vapor_pressure: Option<f64>,
    dew_point: Option<f64>,
    absolute_humidity: Option<f64>,
}

impl Psychrometrics {
    fn new(temperature: f64, humidity: f64) -> Self {
        let equilibrium_vapor_pressure =
            611.2 * (17.67 * temperature / (243.5 + temperature)).exp();
        let v = ((humidity / 100.0) * equilibrium_vapor_pressure / 611.2).ln();
        let dew_point = -243.5 * v / (v - 17.67);
        let absolute_humidity =
            equilibrium_vapor_pressure * humidity * 0.021674 / (273.15 + temperature);
        Self {
            equilibrium_vapor_pressure: round(equilibrium_vapor_pressure, DERIVED_PRECISION),
            dew_point: round(dew_point, DERIVED_PRECISION),
            absolute_humidity: round(absolute_humidity, DERIVED_PRECISION),
        }
    }
}

/// Rounds to the given number of decimal places, or returns `None` for NaN and infinities.
fn round(value: f64, decimals: i32) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let factor = 10.0f64.powi(decimals);
    Some((value * factor).round() / factor)
}
