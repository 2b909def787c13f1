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
//! The pool of fee-payer gas coins, one per network.
//!
//! Two sponsorships must never share a gas coin: the chain rejects the
//! second transaction referencing an already-locked coin, so a claimed coin
//! stays reserved until its sponsorship reaches a terminal state. Claiming
//! happens under a single lock, which makes the claim-then-use sequence
//! atomic with respect to concurrent sponsor calls.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::chain::GasCoin;
use crate::types::ObjectId;

#[derive(Debug, Default)]
struct PoolInner {
    available: VecDeque<GasCoin>,
    reserved: HashSet<ObjectId>,
}

/// A synchronized pool of gas coins owned by the fee payer.
#[derive(Debug, Default)]
pub struct GasPool {
    inner: Mutex<PoolInner>,
}

impl GasPool {
    /// Creates an empty pool; the refresh task fills it from the chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims a coin for one sponsorship.
    ///
    /// Returns `None` when every coin is reserved or the pool is empty.
    pub fn claim(&self) -> Option<GasCoin> {
        let mut inner = self.inner.lock();
        let coin = inner.available.pop_front()?;
        inner.reserved.insert(coin.object_ref.id);
        Some(coin)
    }

    /// Returns an unspent coin to the pool.
    ///
    /// Only valid for coins whose sponsorship was never submitted (rejected
    /// requests, expired sponsorships); a submitted coin's version has
    /// changed and must go through [`GasPool::forget`] instead.
    pub fn release(&self, coin: GasCoin) {
        let mut inner = self.inner.lock();
        inner.reserved.remove(&coin.object_ref.id);
        inner.available.push_back(coin);
    }

    /// Drops a coin that was consumed (or possibly consumed) on-chain.
    ///
    /// The refresh task re-discovers it at its new version.
    pub fn forget(&self, id: &ObjectId) {
        let mut inner = self.inner.lock();
        inner.reserved.remove(id);
        inner.available.retain(|c| &c.object_ref.id != id);
    }

    /// Replaces the available coins with a fresh chain snapshot, keeping
    /// reservations intact.
    pub fn refill(&self, coins: Vec<GasCoin>) {
        let mut inner = self.inner.lock();
        let reserved = inner.reserved.clone();
        inner.available = coins
            .into_iter()
            .filter(|c| !reserved.contains(&c.object_ref.id))
            .collect();
    }

    /// Number of claimable coins.
    pub fn available(&self) -> usize {
        self.inner.lock().available.len()
    }

    /// Number of coins currently reserved by pending sponsorships.
    pub fn reserved(&self) -> usize {
        self.inner.lock().reserved.len()
    }
}
