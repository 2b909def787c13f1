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
//! Storage for pending sponsorships and their terminal outcomes.
//!
//! The store is the serialization point of the whole protocol:
//! [`PendingStore::take_pending`] atomically removes the entry for a digest,
//! so of any number of concurrent execute calls exactly one obtains it and
//! submits. Terminal outcomes are kept as tombstones for a bounded
//! retention window, which is what lets the API distinguish "expired" and
//! "already executed" from "never existed".

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::chain::GasCoin;
use crate::keys::SerializedSignature;
use crate::types::{SuiAddress, TransactionDigest};

pub mod mem;
pub mod sled;

/// A sponsorship awaiting the user's countersignature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSponsorship {
    /// The sponsored transaction bytes returned to the client.
    pub sponsored_bytes: Vec<u8>,
    /// The relay's fee-payer signature over those bytes.
    pub fee_payer_signature: SerializedSignature,
    /// The gas coin reserved for this sponsorship.
    pub gas_coin: GasCoin,
    /// The user that must countersign.
    pub sender: SuiAddress,
    /// The network the transaction targets.
    pub network: String,
    /// Creation time, unix milliseconds.
    pub created_at_ms: u64,
}

impl PendingSponsorship {
    /// Whether this sponsorship fell out of its expiry window.
    pub fn is_expired(&self, ttl_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at_ms) > ttl_ms
    }
}

/// The terminal state of a consumed digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminal {
    /// A submission was attempted and the chain reported an outcome.
    Executed {
        /// When the digest was consumed, unix milliseconds.
        at_ms: u64,
    },
    /// The sponsorship expired before any execute call.
    Expired {
        /// When the expiry was recorded, unix milliseconds.
        at_ms: u64,
    },
    /// A submission timed out; the on-chain outcome was never observed.
    Unknown {
        /// When the digest was consumed, unix milliseconds.
        at_ms: u64,
    },
}

impl Terminal {
    /// When this terminal state was recorded, unix milliseconds.
    pub fn at_ms(&self) -> u64 {
        match self {
            Terminal::Executed { at_ms }
            | Terminal::Expired { at_ms }
            | Terminal::Unknown { at_ms } => *at_ms,
        }
    }
}

/// Storage operations for the sponsorship protocol.
pub trait PendingStore: Clone + Send + Sync {
    /// Stores a freshly-created sponsorship under its digest.
    fn insert_pending(
        &self,
        digest: &TransactionDigest,
        entry: PendingSponsorship,
    ) -> crate::Result<()>;

    /// Returns a copy of the sponsorship for `digest`, leaving it in place.
    ///
    /// Entries are immutable once inserted, so a peeked copy stays faithful
    /// for as long as [`Self::take_pending`] has not consumed the digest.
    fn peek_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>>;

    /// Atomically removes and returns the sponsorship for `digest`.
    ///
    /// This is the at-most-once guarantee: a digest can be taken exactly
    /// once, no matter how many callers race for it.
    fn take_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>>;

    /// Number of sponsorships currently pending.
    fn pending_count(&self) -> crate::Result<usize>;

    /// Records the terminal state of a consumed digest.
    fn record_terminal(
        &self,
        digest: &TransactionDigest,
        terminal: Terminal,
    ) -> crate::Result<()>;

    /// Looks up the terminal state of a digest, if it has one.
    fn terminal_state(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<Terminal>>;

    /// Removes and returns every pending sponsorship older than `ttl_ms`.
    ///
    /// Entries taken concurrently by an execute call are skipped; the
    /// execute path wins such races.
    fn sweep_expired(
        &self,
        ttl_ms: u64,
        now_ms: u64,
    ) -> crate::Result<Vec<(TransactionDigest, PendingSponsorship)>>;

    /// Drops tombstones older than `retention_ms`, returning how many.
    fn prune_terminal(
        &self,
        retention_ms: u64,
        now_ms: u64,
    ) -> crate::Result<usize>;
}

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
