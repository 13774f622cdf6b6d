//! Keep lists in sync until interrupted.

use anyhow::{Context, Result};
use shavar_client::{spawn_sync_task, RunnerConfig, SyncEngine, Transport};
use shavar_store::ChunkStore;
use std::sync::Arc;

/// Run the scheduled runner until Ctrl-C.
pub async fn run<T, S>(engine: Arc<SyncEngine<T, S>>, config: RunnerConfig) -> Result<()>
where
    T: Transport + 'static,
    S: ChunkStore + ?Sized + 'static,
{
    if engine.config().api_key.is_empty() {
        anyhow::bail!("No API key configured. Set server.api_key in the config file.");
    }
    if !config.enabled {
        println!("Runner disabled in config (runner.enabled = false); nothing to do.");
        return Ok(());
    }

    let handle = spawn_sync_task(engine, config);
    println!(
        "Syncing every {}s. Press Ctrl-C to stop.",
        config.poll_interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    handle.abort();

    println!("Stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shavar_client::{MockTransport, SyncConfig};
    use shavar_store::SqliteChunkStore;
    use shavar_types::ListName;
    use std::time::Duration;

    #[tokio::test]
    async fn disabled_runner_returns_immediately() {
        let store = Arc::new(SqliteChunkStore::in_memory().await.unwrap());
        let transport = MockTransport::new();
        let config = SyncConfig::new("key", vec![ListName::from("goog-malware-shavar")]);
        let engine = Arc::new(SyncEngine::new(config, transport.clone(), store));
        let runner = RunnerConfig {
            poll_interval_secs: 1,
            enabled: false,
        };

        tokio::time::timeout(Duration::from_millis(500), run(engine, runner))
            .await
            .expect("disabled runner should not wait for Ctrl-C")
            .unwrap();
        assert!(transport.posts().is_empty());
    }
}
