//! Run one update cycle.

use anyhow::Result;
use shavar_client::{unix_now, CycleOutcome, SyncEngine, Transport};
use shavar_store::{ChunkStore, FullHashCache};
use std::sync::Arc;

use super::status::format_duration;

/// Run the update command.
///
/// A cycle that is refused as too soon is not an error; a failed cycle is.
pub async fn run<T, S>(engine: &SyncEngine<T, S>, force: bool) -> Result<()>
where
    T: Transport,
    S: ChunkStore + ?Sized,
{
    if engine.config().api_key.is_empty() {
        anyhow::bail!("No API key configured. Set server.api_key in the config file.");
    }

    let outcome = engine.run_cycle(force).await;

    let purged = FullHashCache::new(Arc::clone(engine.store()))
        .purge(unix_now())
        .await?;
    if purged > 0 {
        println!("Purged {} expired full hashes", purged);
    }

    match outcome {
        CycleOutcome::TooSoon { wait_secs } => {
            println!(
                "Too soon to update. Next update allowed in {} (use --force to override).",
                format_duration(wait_secs)
            );
        }
        CycleOutcome::Synced(report) => {
            println!("Update complete:");
            println!("  Directives: {}", report.directives);
            println!("  Redirects:  {}", report.redirects);
            println!("  Inserted:   {}", report.applied.inserted);
            println!("  Deleted:    {}", report.applied.deleted);
            if report.rekey_requested {
                println!("  Server requested rekey");
            }
            if report.applied.resets > 0 {
                println!("  Server requested reset; local data was cleared");
            }
            println!(
                "  Next:       in {}",
                format_duration(report.schedule.next_attempt.saturating_sub(unix_now()))
            );
        }
        CycleOutcome::Failed(failure) => {
            if let Some(schedule) = failure.schedule {
                println!(
                    "Failure {} in a row; next attempt in {} minutes.",
                    schedule.error_count, failure.backoff_minutes
                );
            }
            anyhow::bail!("Update failed: {}", failure.error);
        }
    }

    Ok(())
}
