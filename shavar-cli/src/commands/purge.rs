//! Drop full hashes that are no longer trusted.

use anyhow::{Context, Result};
use shavar_store::{ChunkStore, FullHashCache};
use std::sync::Arc;

/// Run the purge command. Returns the number of hashes removed.
pub async fn run<S: ChunkStore + ?Sized>(store: Arc<S>, now: u64) -> Result<u64> {
    let purged = FullHashCache::new(store)
        .purge(now)
        .await
        .context("Failed to purge full hashes")?;
    println!("Purged {} expired full hashes.", purged);
    Ok(purged)
}
