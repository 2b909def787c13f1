use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{PendingSponsorship, PendingStore, Terminal};
use crate::types::TransactionDigest;

/// An ephemeral, in-memory [`PendingStore`] for tests and `--tmp` runs.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pending: Arc<RwLock<HashMap<TransactionDigest, PendingSponsorship>>>,
    terminal: Arc<RwLock<HashMap<TransactionDigest, Terminal>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl PendingStore for InMemoryStore {
    fn insert_pending(
        &self,
        digest: &TransactionDigest,
        entry: PendingSponsorship,
    ) -> crate::Result<()> {
        self.pending.write().insert(*digest, entry);
        Ok(())
    }

    fn peek_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>> {
        Ok(self.pending.read().get(digest).cloned())
    }

    fn take_pending(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<PendingSponsorship>> {
        Ok(self.pending.write().remove(digest))
    }

    fn pending_count(&self) -> crate::Result<usize> {
        Ok(self.pending.read().len())
    }

    fn record_terminal(
        &self,
        digest: &TransactionDigest,
        terminal: Terminal,
    ) -> crate::Result<()> {
        self.terminal.write().insert(*digest, terminal);
        Ok(())
    }

    fn terminal_state(
        &self,
        digest: &TransactionDigest,
    ) -> crate::Result<Option<Terminal>> {
        Ok(self.terminal.read().get(digest).copied())
    }

    fn sweep_expired(
        &self,
        ttl_ms: u64,
        now_ms: u64,
    ) -> crate::Result<Vec<(TransactionDigest, PendingSponsorship)>> {
        let mut guard = self.pending.write();
        let expired: Vec<TransactionDigest> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired(ttl_ms, now_ms))
            .map(|(digest, _)| *digest)
            .collect();
        let mut swept = Vec::with_capacity(expired.len());
        for digest in expired {
            if let Some(entry) = guard.remove(&digest) {
                swept.push((digest, entry));
            }
        }
        Ok(swept)
    }

    fn prune_terminal(
        &self,
        retention_ms: u64,
        now_ms: u64,
    ) -> crate::Result<usize> {
        let mut guard = self.terminal.write();
        let before = guard.len();
        guard.retain(|_, t| now_ms.saturating_sub(t.at_ms()) <= retention_ms);
        Ok(before - guard.len())
    }
}
