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

use std::path::Path;

use super::{PendingSponsorship, PendingStore, Terminal};
use crate::error::Error;
use crate::types::TransactionDigest;

/// Persistent [`PendingStore`] backed by [Sled](https://sled.rs).
///
/// Keys are the raw 32-byte digests; values are BCS. `take_pending` maps to
/// `sled::Tree::remove`, which atomically returns the previous value, so a
/// raced digest is only ever obtained by one caller.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    pending: sled::Tree,
    terminal: sled::Tree,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Opens the store at the given path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .temporary(cfg!(test))
            .use_compression(true)
            .open()?;
        Self::with_db(db)
    }

    /// Creates a temporary store that is deleted when the process exits.
    pub fn temporary() -> crate::Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::with_db(db)
    }

    fn with_db(db: sled::Db) -> crate::Result<Self> {
        let pending = db.open_tree("pending_sponsorships")?;
        let terminal = db.open_tree("sponsorship_terminals")?;
        Ok(Self {
            db,
            pending,
            terminal,
        })
    }

    /// On-disk size of the store, in bytes.
    pub fn size_on_disk(&self) -> crate::Result<u64> {
        Ok(self.db.size_on_disk()?)
    }

    fn decode_pending(bytes: &[u8]) -> crate::Result<PendingSponsorship> {
        bcs::from_bytes(bytes).map_err(|_| {
            Error::Generic("corrupted pending sponsorship entry in the store")
        })
    }

    fn decode_terminal(bytes: &[u8]) -> crate::Result<Terminal> {
        bcs::from_bytes(bytes)
            .map_err(|_| Error::Generic("corrupted tombstone entry in the store"))
    }
}

impl PendingStore for SledStore {
    fn insert_pending(
        &self,
        digest: &TransactionDigest,
        entry: PendingSponsorship,
    ) -> crate::Result<()> {
        let value = bcs::to_bytes(&entry)?;
        self.pending.insert(digest.as_bytes(), value)?;
        Ok(())
    }

    fn peek_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>> {
        match self.pending.get(digest.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_pending(&bytes)?)),
            None => Ok(None),
        }
    }

    fn take_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>> {
        match self.pending.remove(digest.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_pending(&bytes)?)),
            None => Ok(None),
        }
    }

    fn pending_count(&self) -> crate::Result<usize> {
        Ok(self.pending.len())
    }

    fn record_terminal(
        &self,
        digest: &TransactionDigest,
        terminal: Terminal,
    ) -> crate::Result<()> {
        let value = bcs::to_bytes(&terminal)?;
        self.terminal.insert(digest.as_bytes(), value)?;
        Ok(())
    }

    fn terminal_state(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<Terminal>> {
        match self.terminal.get(digest.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_terminal(&bytes)?)),
            None => Ok(None),
        }
    }

    fn sweep_expired(
        &self,
        ttl_ms: u64,
        now_ms: u64,
    ) -> crate::Result<Vec<(TransactionDigest, PendingSponsorship)>> {
        let mut expired = Vec::new();
        for item in self.pending.iter() {
            let (key, value) = item?;
            let entry = Self::decode_pending(&value)?;
            if !entry.is_expired(ttl_ms, now_ms) {
                continue;
            }
            let bytes: [u8; 32] = key.as_ref().try_into().map_err(|_| {
                Error::Generic("corrupted digest key in the store")
            })?;
            expired.push(TransactionDigest::new(bytes));
        }
        let mut swept = Vec::with_capacity(expired.len());
        for digest in expired {
            // an execute call may have taken the entry since the scan.
            if let Some(bytes) = self.pending.remove(digest.as_bytes())? {
                swept.push((digest, Self::decode_pending(&bytes)?));
            }
        }
        Ok(swept)
    }

    fn prune_terminal(
        &self,
        retention_ms: u64,
        now_ms: u64,
    ) -> crate::Result<usize> {
        let mut stale = Vec::new();
        for item in self.terminal.iter() {
            let (key, value) = item?;
            let terminal = Self::decode_terminal(&value)?;
            if now_ms.saturating_sub(terminal.at_ms()) > retention_ms {
                stale.push(key);
            }
        }
        let mut pruned = 0;
        for key in stale {
            if self.terminal.remove(key)?.is_some() {
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}
