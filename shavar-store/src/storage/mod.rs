//! Storage layer for shavar-store.
//!
//! Holds add entries, sub entries, full hashes and the retry schedule, and
//! applies directive batches atomically.

mod sqlite;

pub use sqlite::SqliteChunkStore;

use crate::error::StoreError;
use async_trait::async_trait;
use shavar_types::{
    AddEntry, ChunkNum, ChunkRange, Directive, FullHash, FullHashEntry, HostKey, ListName,
    RetrySchedule, SubEntry,
};

/// Row counts written by one directive batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Rows inserted (duplicates excluded).
    pub inserted: u64,
    /// Insert directives that hit an existing row.
    pub duplicates: u64,
    /// Rows removed by range deletes.
    pub deleted: u64,
    /// Number of `ResetAll` directives applied.
    pub resets: u32,
}

/// Row counts across the store, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Rows in the add table, sentinels included.
    pub add_entries: u64,
    /// Rows in the sub table, sentinels included.
    pub sub_entries: u64,
    /// Full-hash rows, expired or not.
    pub full_hashes: u64,
}

/// Trait for chunk storage backends.
///
/// Duplicate inserts and deletes that match nothing are ordinary outcomes,
/// not errors.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert an add entry.
    ///
    /// Returns `false` if an identical entry already existed.
    async fn insert_add(&self, entry: &AddEntry) -> Result<bool, StoreError>;

    /// Insert a sub entry. A matching add entry need not exist.
    ///
    /// Returns `false` if an entry with the same join key already existed.
    async fn insert_sub(&self, entry: &SubEntry) -> Result<bool, StoreError>;

    /// Delete add chunks in `range`, together with sub entries and full
    /// hashes keyed on those add chunks.
    ///
    /// Returns the number of rows removed.
    async fn delete_add_range(&self, list: &ListName, range: ChunkRange)
        -> Result<u64, StoreError>;

    /// Delete sub chunks in `range`.
    ///
    /// Returns the number of rows removed.
    async fn delete_sub_range(&self, list: &ListName, range: ChunkRange)
        -> Result<u64, StoreError>;

    /// Insert a full hash, or refresh `created_at` if it is already known.
    async fn upsert_full_hash(&self, entry: &FullHashEntry) -> Result<(), StoreError>;

    /// Delete full hashes no longer trusted at `now`.
    ///
    /// Returns the number of rows removed.
    async fn purge_expired_full_hashes(&self, now: u64) -> Result<u64, StoreError>;

    /// Full-hash entries for `hash` with `created_at > cutoff`.
    async fn find_full_hashes(
        &self,
        hash: &FullHash,
        cutoff: u64,
    ) -> Result<Vec<FullHashEntry>, StoreError>;

    /// Held add chunk numbers for `list`, ascending and distinct.
    ///
    /// Empty chunks count as held.
    async fn distinct_add_chunk_numbers(&self, list: &ListName)
        -> Result<Vec<ChunkNum>, StoreError>;

    /// Held sub chunk numbers for `list`, ascending and distinct.
    ///
    /// Empty chunks count as held.
    async fn distinct_sub_chunk_numbers(&self, list: &ListName)
        -> Result<Vec<ChunkNum>, StoreError>;

    /// Live add entries under the given host keys: those with no sub entry
    /// sharing `(list, add_chunk, host_key, prefix)`.
    async fn lookup_candidate_prefixes(
        &self,
        host_keys: &[HostKey],
    ) -> Result<Vec<AddEntry>, StoreError>;

    /// Apply directives in order, all or nothing.
    async fn apply_batch(&self, directives: &[Directive]) -> Result<ApplySummary, StoreError>;

    /// Apply directives and swap the retry schedule from `expected` to
    /// `next` in one transaction.
    ///
    /// Fails with [`StoreError::ScheduleConflict`] (and applies nothing) if
    /// the stored schedule is no longer `expected`.
    async fn commit_cycle(
        &self,
        directives: &[Directive],
        expected: RetrySchedule,
        next: RetrySchedule,
    ) -> Result<ApplySummary, StoreError>;

    /// Read the retry schedule.
    async fn read_retry_schedule(&self) -> Result<RetrySchedule, StoreError>;

    /// Swap the retry schedule from `expected` to `next`.
    async fn write_retry_schedule(
        &self,
        expected: RetrySchedule,
        next: RetrySchedule,
    ) -> Result<(), StoreError>;

    /// Clear add, sub and full-hash tables and reset the retry schedule.
    async fn reset_all(&self) -> Result<(), StoreError>;

    /// Row counts, for status output.
    async fn stats(&self) -> Result<StoreStats, StoreError>;
}
