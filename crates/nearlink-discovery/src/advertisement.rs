//! Decoding of raw manufacturer-specific advertisement data
//!
//! The phone advertises its sid as plain ASCII under a fixed manufacturer id, with
//! no service UUID and no device name, to stay inside the 31-byte legacy
//! advertising payload.

use crate::error::{DiscoveryError, DiscoveryResult};
use nearlink_core::AdvertisementSample;
use std::collections::HashMap;

/// Extract the broadcast identifier from a manufacturer payload.
///
/// Non-ASCII bytes are skipped and surrounding whitespace (including NUL padding)
/// is trimmed.
pub fn decode_identifier(payload: &[u8]) -> DiscoveryResult<String> {
    let identifier: String = payload
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    let identifier = identifier.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    if identifier.is_empty() {
        return Err(DiscoveryError::MalformedAdvertisement(
            "empty identifier".to_string(),
        ));
    }
    Ok(identifier.to_string())
}

/// Build a sample from one advertisement's manufacturer data
pub fn sample_from_manufacturer_data(
    address: &str,
    rssi: Option<i16>,
    manufacturer_data: &HashMap<u16, Vec<u8>>,
    company_id: u16,
) -> DiscoveryResult<AdvertisementSample> {
    let payload = manufacturer_data
        .get(&company_id)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            DiscoveryError::MalformedAdvertisement(format!(
                "no payload for company id 0x{:04X}",
                company_id
            ))
        })?;

    let identifier = decode_identifier(payload)?;
    Ok(AdvertisementSample::new(address, identifier, rssi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_ascii() {
        assert_eq!(decode_identifier(b"abc123def456").unwrap(), "abc123def456");
    }

    #[test]
    fn test_decode_trims_and_skips_non_ascii() {
        assert_eq!(decode_identifier(b"  abc\xff123\0\0").unwrap(), "abc123");
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert!(matches!(
            decode_identifier(b"   \0"),
            Err(DiscoveryError::MalformedAdvertisement(_))
        ));
        assert!(decode_identifier(b"\xfe\xff").is_err());
    }

    #[test]
    fn test_sample_from_manufacturer_data() {
        let mut data = HashMap::new();
        data.insert(0x1234, b"abc123def456".to_vec());
        data.insert(0x004C, b"other".to_vec());

        let sample =
            sample_from_manufacturer_data("AA:BB:CC:DD:EE:FF", Some(-50), &data, 0x1234).unwrap();
        assert_eq!(sample.identifier, "abc123def456");
        assert_eq!(sample.rssi, Some(-50));
        assert_eq!(sample.address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_sample_requires_company_payload() {
        let mut data = HashMap::new();
        data.insert(0x004C, b"other".to_vec());
        assert!(sample_from_manufacturer_data("addr", Some(-50), &data, 0x1234).is_err());

        data.insert(0x1234, Vec::new());
        assert!(sample_from_manufacturer_data("addr", Some(-50), &data, 0x1234).is_err());
    }
}
