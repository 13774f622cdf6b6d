//! Background update task.
//!
//! Ticks periodically, runs one non-forced cycle per tick and purges
//! expired full hashes. The retry schedule decides whether a tick actually
//! talks to the server.

use crate::engine::{unix_now, CycleOutcome, SyncEngine};
use crate::transport::Transport;
use shavar_store::{ChunkStore, FullHashCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Default seconds between ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Scheduling for the background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Seconds between ticks.
    pub poll_interval_secs: u64,
    /// Whether the task runs at all.
    pub enabled: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            enabled: true,
        }
    }
}

/// Spawn a background update task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_sync_task<T, S>(
    engine: Arc<SyncEngine<T, S>>,
    config: RunnerConfig,
) -> tokio::task::JoinHandle<()>
where
    T: Transport + 'static,
    S: ChunkStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Update task disabled");
            return;
        }

        let interval_secs = config.poll_interval_secs.max(1);
        tracing::info!("Update task started (interval: {}s)", interval_secs);

        let cache = FullHashCache::new(Arc::clone(engine.store()));
        let mut timer = interval(Duration::from_secs(interval_secs));

        loop {
            timer.tick().await;

            match engine.run_cycle(false).await {
                CycleOutcome::TooSoon { wait_secs } => {
                    tracing::debug!("Update: next attempt in {}s", wait_secs);
                }
                CycleOutcome::Synced(report) => {
                    tracing::debug!("Update: {} directives applied", report.directives);
                }
                CycleOutcome::Failed(failure) => {
                    tracing::debug!(
                        "Update: failed, backing off {} minutes",
                        failure.backoff_minutes
                    );
                }
            }

            if let Err(e) = cache.purge(unix_now()).await {
                tracing::error!("Full-hash purge error: {}", e);
            }
        }
    })
}
