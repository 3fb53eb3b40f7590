//! Conversion between the hex strings which advertisements are relayed as and raw bytes.

use crate::DecodeError;

/// Decodes a hex string (upper or lower case) into bytes.
pub fn decode(hex: &str) -> Result<Vec<u8>, DecodeError> {
    ::hex::decode(hex).map_err(|e| DecodeError::InvalidHex(e.to_string()))
}

/// Encodes bytes as an upper case hex string, the form in which payload signatures are matched.
pub fn encode(bytes: &[u8]) -> String {
    ::hex::encode_upper(bytes)
}
