//! Clear all local list data.

use anyhow::{Context, Result};
use shavar_store::ChunkStore;

/// Run the flush command.
pub async fn run<S: ChunkStore + ?Sized>(store: &S) -> Result<()> {
    store
        .reset_all()
        .await
        .context("Failed to clear list data")?;
    println!("All list data and the retry schedule were cleared.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shavar_store::SqliteChunkStore;
    use shavar_types::{AddEntry, HostKey, ListName, Prefix, RetrySchedule};

    #[tokio::test]
    async fn flush_clears_entries_and_schedule() {
        let store = SqliteChunkStore::in_memory().await.unwrap();
        store
            .insert_add(&AddEntry {
                list: ListName::from("goog-malware-shavar"),
                add_chunk: 1,
                host_key: HostKey::new([1, 2, 3, 4]),
                prefix: Prefix::from_bytes(&[5, 6, 7, 8]).unwrap(),
            })
            .await
            .unwrap();
        let failed = RetrySchedule {
            next_attempt: 60,
            error_count: 1,
            last_attempt: 0,
            last_success: 0,
        };
        store
            .write_retry_schedule(RetrySchedule::default(), failed)
            .await
            .unwrap();

        run(&store).await.unwrap();

        assert_eq!(store.stats().await.unwrap().add_entries, 0);
        assert_eq!(
            store.read_retry_schedule().await.unwrap(),
            RetrySchedule::default()
        );
    }
}
