//! # shavar-store
//!
//! Persisted reconciliation state for shavar threat-list sync.
//!
//! The store owns four kinds of state:
//! - add entries: prefixes published under add chunks
//! - sub entries: retractions published under sub chunks
//! - full hashes: confirmed 32-byte hashes, trusted for 45 minutes
//! - the retry schedule: a single row gating the next sync cycle
//!
//! ## Architecture
//!
//! ```text
//!   SyncEngine ──► ChunkStore (trait) ──► SqliteChunkStore
//!                                            ┌──────────────────────┐
//!                                            │ add_entries          │
//!                                            │ sub_entries          │
//!                                            │ full_hashes          │
//!                                            │ retry_schedule (1)   │
//!                                            └──────────────────────┘
//! ```
//!
//! Directive batches are applied in one transaction. A cycle commit also
//! swaps the retry schedule with a compare-and-swap in that same
//! transaction, so two writers can never both win the gate.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod storage;

pub use cache::FullHashCache;
pub use error::{StoreError, StoreResult};
pub use storage::{ApplySummary, ChunkStore, SqliteChunkStore, StoreStats};
