// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth hardware address parsing.
//!
//! Accepted encodings, case-insensitive:
//! - `AA:BB:CC:DD:EE:FF`
//! - `AA-BB-CC-DD-EE-FF`
//! - `AABBCCDDEEFF`

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Canonical 48-bit device address.
///
/// Octets are stored most-significant first, the same order as the text
/// form and as [`bluer::Address`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    /// Create an address from MSB-first octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// MSB-first octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The address as a 48-bit integer.
    pub fn as_u64(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    /// Build an address from the low 48 bits of `value`.
    pub fn from_u64(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let mut octets = [0u8; 6];
        octets.copy_from_slice(&bytes[2..]);
        Self(octets)
    }
}

fn decode_groups(text: &str, separator: char) -> Option<[u8; 6]> {
    let mut octets = [0u8; 6];
    let mut count = 0;

    for group in text.split(separator) {
        if count == 6 || group.len() != 2 {
            return None;
        }
        let decoded = hex::decode(group).ok()?;
        octets[count] = decoded[0];
        count += 1;
    }

    (count == 6).then_some(octets)
}

fn decode_contiguous(text: &str) -> Option<[u8; 6]> {
    if text.len() != 12 {
        return None;
    }
    let mut octets = [0u8; 6];
    hex::decode_to_slice(text, &mut octets).ok()?;
    Some(octets)
}

impl FromStr for DeviceAddress {
    type Err = BridgeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let octets = if text.contains(':') {
            decode_groups(text, ':')
        } else if text.contains('-') {
            decode_groups(text, '-')
        } else {
            decode_contiguous(text)
        };

        octets
            .map(Self)
            .ok_or_else(|| BridgeError::InvalidAddress(text.to_string()))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl From<bluer::Address> for DeviceAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

impl From<DeviceAddress> for bluer::Address {
    fn from(addr: DeviceAddress) -> Self {
        bluer::Address::new(addr.0)
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OCTETS: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

    #[test]
    fn test_all_encodings_agree() {
        let forms = [
            "AA:BB:CC:DD:EE:FF",
            "aa:bb:cc:dd:ee:ff",
            "AA-BB-CC-DD-EE-FF",
            "aA-bB-cC-dD-eE-fF",
            "AABBCCDDEEFF",
            "aabbccddeeff",
        ];

        for form in forms {
            let addr: DeviceAddress = form.parse().unwrap();
            assert_eq!(addr.octets(), OCTETS, "form {}", form);
        }
    }

    #[test]
    fn test_display_is_uppercase_colon() {
        let addr: DeviceAddress = "00-1a-7d-da-71-13".parse().unwrap();
        assert_eq!(addr.to_string(), "00:1A:7D:DA:71:13");
    }

    #[test]
    fn test_u64_value() {
        let addr = DeviceAddress::new(OCTETS);
        assert_eq!(addr.as_u64(), 0xAABB_CCDD_EEFF);
        assert_eq!(DeviceAddress::from_u64(0xAABB_CCDD_EEFF), addr);
        assert_eq!(DeviceAddress::from_u64(0xFFFF_0000_0000_0001).as_u64(), 1);
    }

    #[test]
    fn test_rejects_malformed() {
        let bad = [
            "",
            "AA:BB:CC:DD:EE",
            "AA:BB:CC:DD:EE:FF:00",
            "AA:BB:CC:DD:EE:GG",
            "A:BB:CC:DD:EE:FF",
            "AAA:BB:CC:DD:EE:FF",
            "AA:BB-CC:DD:EE:FF",
            "AA:BB:CC:DD:EE:FF ",
            " AABBCCDDEEFF",
            "AABBCCDDEEF",
            "AABBCCDDEEFF0",
            "AABBCCDDEEFG",
            "AA BB CC DD EE FF",
        ];

        for text in bad {
            let err = text.parse::<DeviceAddress>().unwrap_err();
            assert_eq!(err.error_code(), "INVALID_ADDRESS", "input {:?}", text);
        }
    }

    #[test]
    fn test_bluer_conversion() {
        let addr = DeviceAddress::new(OCTETS);
        let bluer_addr: bluer::Address = addr.into();
        assert_eq!(bluer_addr.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(DeviceAddress::from(bluer_addr), addr);
    }

    #[test]
    fn test_serde_as_string() {
        let addr = DeviceAddress::new(OCTETS);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:FF\"");

        let parsed: DeviceAddress = serde_json::from_str("\"aabbccddeeff\"").unwrap();
        assert_eq!(parsed, addr);
        assert!(serde_json::from_str::<DeviceAddress>("\"nope\"").is_err());
    }
}
