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
//! Allow-list enforcement over decoded transactions.

use std::collections::HashSet;

use crate::config::SponsorConfig;
use crate::error::Error;
use crate::transaction::DecodedTransaction;
use crate::types::{MoveCallTarget, SuiAddress};

/// The allow-lists a sponsorship request is checked against.
///
/// Both lists are optional. An absent target list admits every Move call
/// (subject to the relay-wide list from configuration); an absent address
/// list defaults to `[sender]`, so by default a transaction may only move
/// value back to the address that signs it.
#[derive(Debug, Clone, Default)]
pub struct SponsorshipPolicy {
    /// Targets the request's Move calls must be drawn from.
    pub allowed_move_call_targets: Option<Vec<MoveCallTarget>>,
    /// Addresses the transaction may reference as recipients or sensitive
    /// arguments.
    pub allowed_addresses: Option<Vec<SuiAddress>>,
}

impl SponsorshipPolicy {
    /// Checks a decoded transaction against this policy plus the relay-wide
    /// target list from `config`.
    ///
    /// The first violating target or address is reported; a transaction that
    /// moves value to a recipient the decoder cannot resolve to a literal
    /// address is rejected whenever an address policy is in force.
    pub fn check(
        &self,
        decoded: &DecodedTransaction,
        sender: &SuiAddress,
        config: &SponsorConfig,
    ) -> crate::Result<()> {
        self.check_targets(decoded, config)?;
        self.check_addresses(decoded, sender)
    }

    fn check_targets(
        &self,
        decoded: &DecodedTransaction,
        config: &SponsorConfig,
    ) -> crate::Result<()> {
        let targets = decoded.move_call_targets();
        if let Some(global) = &config.allowed_move_call_targets {
            let allowed: HashSet<&MoveCallTarget> = global.iter().collect();
            for target in &targets {
                if !allowed.contains(target) {
                    return Err(Error::TargetNotAllowed {
                        target: target.to_string(),
                    });
                }
            }
        }
        if let Some(requested) = &self.allowed_move_call_targets {
            let allowed: HashSet<&MoveCallTarget> = requested.iter().collect();
            for target in &targets {
                if !allowed.contains(target) {
                    return Err(Error::TargetNotAllowed {
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_addresses(
        &self,
        decoded: &DecodedTransaction,
        sender: &SuiAddress,
    ) -> crate::Result<()> {
        let default_list;
        let allowed: HashSet<&SuiAddress> = match &self.allowed_addresses {
            Some(list) => list.iter().collect(),
            None => {
                default_list = [*sender];
                default_list.iter().collect()
            }
        };
        if decoded.has_non_literal_recipient()? {
            return Err(Error::AddressNotAllowed {
                address: "<non-literal recipient>".to_string(),
            });
        }
        for address in decoded.policy_addresses()? {
            if !allowed.contains(&address) {
                return Err(Error::AddressNotAllowed {
                    address: address.to_string(),
                });
            }
        }
        Ok(())
    }
}
