//! Support for Xiaomi Mi Flora plant sensor advertisements (MiBeacon service data with product ID
//! 0x0098), which carry a single measurement per advertisement.

use crate::{DecodeError, Format};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{self, Display, Formatter};

/// Service data type 0x16, UUID 0xfe95, frame control 0x2071, product ID 0x0098.
pub const SIGNATURE: &str = "1695FE71209800";

/// MiBeacon service data from some other Xiaomi device, or a Mi Flora advertisement which was cut
/// short.
pub const PARTIAL_SIGNATURE: &str = "1695FE";

/// Offset of the low byte of the MiBeacon object ID in the relayed advertisement.
const TAG_OFFSET: usize = 23;

/// The kind of measurement carried by an advertisement.
#[derive(Copy, Clone, Debug, Eq, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    Temperature = 4,
    Battery = 5,
    Illuminance = 7,
    Moisture = 8,
    Conductivity = 9,
}

impl Tag {
    /// The number of bytes at the end of the advertisement which hold the value.
    fn width(self) -> usize {
        match self {
            Self::Temperature | Self::Conductivity => 2,
            Self::Battery | Self::Moisture => 1,
            Self::Illuminance => 3,
        }
    }
}

/// A single measurement from a Mi Flora sensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SensorReading {
    /// Temperature in tenths of a degree Celsius.
    Temperature(i16),
    /// Battery level as a percentage.
    Battery(u8),
    /// Illuminance in lux.
    Illuminance(u32),
    /// Soil moisture as a percentage.
    Moisture(u8),
    /// Soil conductivity in µS/cm.
    Conductivity(u16),
}

impl SensorReading {
    /// Decodes the full advertisement bytes of a payload which has already been matched against
    /// [`SIGNATURE`].
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let tag_byte = *data.get(TAG_OFFSET).ok_or(DecodeError::TooShort {
            format: Format::Flora,
            length: data.len(),
            required: TAG_OFFSET + 1,
        })?;
        let tag =
            Tag::try_from(tag_byte).map_err(|e| DecodeError::UnknownFloraTag(e.number))?;
        let required = TAG_OFFSET + 1 + tag.width();
        if data.len() < required {
            return Err(DecodeError::TooShort {
                format: Format::Flora,
                length: data.len(),
                required,
            });
        }
        let value = &data[data.len() - tag.width()..];
        Ok(match tag {
            Tag::Temperature => Self::Temperature(i16::from_be_bytes([value[0], value[1]])),
            Tag::Battery => Self::Battery(value[0]),
            Tag::Illuminance => {
                Self::Illuminance(u32::from_be_bytes([0, value[0], value[1], value[2]]))
            }
            Tag::Moisture => Self::Moisture(value[0]),
            Tag::Conductivity => Self::Conductivity(u16::from_be_bytes([value[0], value[1]])),
        })
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::Temperature(_) => Tag::Temperature,
            Self::Battery(_) => Tag::Battery,
            Self::Illuminance(_) => Tag::Illuminance,
            Self::Moisture(_) => Tag::Moisture,
            Self::Conductivity(_) => Tag::Conductivity,
        }
    }
}

impl Display for SensorReading {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Temperature(temperature) => {
                write!(f, "{:0.1}°C", f64::from(*temperature) / 10.0)
            }
            Self::Battery(battery) => write!(f, "{battery}% battery"),
            Self::Illuminance(lux) => write!(f, "{lux} lx"),
            Self::Moisture(moisture) => write!(f, "{moisture}% moisture"),
            Self::Conductivity(conductivity) => write!(f, "{conductivity} µS/cm"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_codec;

    /// Flags, a 16-bit UUID list, then MiBeacon service data up to and including the capability
    /// byte, so that the object ID starts at byte 23.
    const HEADER: &str = "020106030395FE131695FE712098005EF6AB8D7CC4800D";

    fn payload(tag: u8, tail: &str) -> Vec<u8> {
        hex_codec::decode(&format!("{HEADER}{tag:02X}10{tail}")).unwrap()
    }

    #[test]
    fn header_puts_tag_at_offset() {
        assert_eq!(hex_codec::decode(HEADER).unwrap().len(), TAG_OFFSET);
    }

    #[test]
    fn decode_moisture() {
        assert_eq!(
            SensorReading::decode(&payload(8, "012A")),
            Ok(SensorReading::Moisture(42))
        );
    }

    #[test]
    fn decode_temperature() {
        let reading = SensorReading::decode(&payload(4, "0200D2")).unwrap();
        assert_eq!(reading, SensorReading::Temperature(210));
        assert_eq!(reading.tag(), Tag::Temperature);
        assert_eq!(reading.to_string(), "21.0°C");
    }

    #[test]
    fn decode_negative_temperature() {
        assert_eq!(
            SensorReading::decode(&payload(4, "02FFEC")),
            Ok(SensorReading::Temperature(-20))
        );
    }

    #[test]
    fn decode_battery() {
        assert_eq!(
            SensorReading::decode(&payload(5, "015F")),
            Ok(SensorReading::Battery(95))
        );
    }

    #[test]
    fn decode_illuminance() {
        assert_eq!(
            SensorReading::decode(&payload(7, "03012C05")),
            Ok(SensorReading::Illuminance(0x012c05))
        );
    }

    #[test]
    fn decode_conductivity() {
        assert_eq!(
            SensorReading::decode(&payload(9, "02015E")),
            Ok(SensorReading::Conductivity(350))
        );
    }

    #[test]
    fn decode_unknown_tag() {
        assert_eq!(
            SensorReading::decode(&payload(99, "012A")),
            Err(DecodeError::UnknownFloraTag(99))
        );
    }

    #[test]
    fn decode_missing_tag() {
        assert_eq!(
            SensorReading::decode(&hex_codec::decode("1695FE71209800").unwrap()),
            Err(DecodeError::TooShort {
                format: Format::Flora,
                length: 7,
                required: 24,
            })
        );
    }

    #[test]
    fn decode_missing_value() {
        // Illuminance needs three value bytes after the tag.
        let data = hex_codec::decode(&format!("{HEADER}0710")).unwrap();
        assert_eq!(
            SensorReading::decode(&data),
            Err(DecodeError::TooShort {
                format: Format::Flora,
                length: 25,
                required: 27,
            })
        );
    }
}
