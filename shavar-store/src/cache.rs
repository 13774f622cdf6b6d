//! Time-bounded view over stored full hashes.

use crate::error::StoreError;
use crate::storage::ChunkStore;
use shavar_types::{ChunkNum, FullHash, FullHashEntry, ListName};
use std::sync::Arc;

/// Answers "is this exact hash currently known bad".
///
/// A full hash is trusted for 45 minutes after it was last confirmed.
pub struct FullHashCache<S: ChunkStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ChunkStore + ?Sized> Clone for FullHashCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ChunkStore + ?Sized> FullHashCache<S> {
    /// Wrap a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record a confirmed hash at `now`, refreshing it if already known.
    pub async fn insert(
        &self,
        list: ListName,
        add_chunk: ChunkNum,
        hash: FullHash,
        now: u64,
    ) -> Result<(), StoreError> {
        self.store
            .upsert_full_hash(&FullHashEntry {
                list,
                add_chunk,
                hash,
                created_at: now,
            })
            .await
    }

    /// Entries for `hash` still trusted at `now`.
    pub async fn entries_for(
        &self,
        hash: &FullHash,
        now: u64,
    ) -> Result<Vec<FullHashEntry>, StoreError> {
        self.store
            .find_full_hashes(hash, FullHashEntry::cutoff(now))
            .await
    }

    /// Whether `hash` is known bad at `now`.
    pub async fn is_known_bad(&self, hash: &FullHash, now: u64) -> Result<bool, StoreError> {
        Ok(!self.entries_for(hash, now).await?.is_empty())
    }

    /// Delete entries no longer trusted at `now`.
    pub async fn purge(&self, now: u64) -> Result<u64, StoreError> {
        let purged = self.store.purge_expired_full_hashes(now).await?;
        if purged > 0 {
            tracing::debug!("Purged {} expired full hashes", purged);
        }
        Ok(purged)
    }
}
