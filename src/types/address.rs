// Copyright 2024 Suilens Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A 32-byte Sui account address.
///
/// Parsed from `0x`-prefixed hex. Short forms like `0x2` are accepted and
/// left-padded, matching how addresses appear in Move call targets; the
/// canonical display form is always the full 64-nibble hex string.
///
/// In human-readable formats (JSON, TOML) the address serializes as its hex
/// string; in binary formats (BCS) it serializes as the raw 32-byte array.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiAddress([u8; 32]);

impl SuiAddress {
    /// The length of a Sui address, in bytes.
    pub const LENGTH: usize = 32;

    /// Creates an address from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of this address.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Interprets a BCS pure-argument value as an address, if it has the
    /// right length.
    pub fn from_pure_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl std::fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for SuiAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SuiAddress({})", self)
    }
}

impl FromStr for SuiAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAddress {
            address: s.to_string(),
        };
        let hex_part = s.strip_prefix("0x").ok_or_else(invalid)?;
        if hex_part.is_empty() || hex_part.len() > Self::LENGTH * 2 {
            return Err(invalid());
        }
        // left-pad short forms to the full 64 nibbles before decoding.
        let padded = format!("{:0>64}", hex_part);
        let raw = hex::decode(padded).map_err(|_| invalid())?;
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl Serialize for SuiAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_str(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <[u8; 32]>::deserialize(deserializer)?;
            Ok(Self(bytes))
        }
    }
}
