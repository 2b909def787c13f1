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

use super::SuiAddress;
use crate::error::Error;

/// A fully-qualified Move entry point, `package::module::function`.
///
/// Allow-lists are matched on the parsed, normalized form, so `0x2::pay::split`
/// and its zero-padded spelling compare equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MoveCallTarget {
    /// The package the entry point lives in.
    pub package: SuiAddress,
    /// The Move module name.
    pub module: String,
    /// The Move function name.
    pub function: String,
}

fn is_move_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl std::fmt::Display for MoveCallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.function)
    }
}

impl std::fmt::Debug for MoveCallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MoveCallTarget({})", self)
    }
}

impl FromStr for MoveCallTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidMoveCallTarget {
            target: s.to_string(),
        };
        let mut parts = s.split("::");
        let package = parts.next().ok_or_else(invalid)?;
        let module = parts.next().ok_or_else(invalid)?;
        let function = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        if !is_move_identifier(module) || !is_move_identifier(function) {
            return Err(invalid());
        }
        let package: SuiAddress = package.parse().map_err(|_| invalid())?;
        Ok(Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
        })
    }
}

impl Serialize for MoveCallTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MoveCallTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
