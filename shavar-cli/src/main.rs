//! # shavar-sync
//!
//! Keeps a local SQLite copy of shavar threat lists in sync.
//!
//! ## Commands
//!
//! - `update`: Run one update cycle
//! - `run`: Keep updating on a schedule until Ctrl-C
//! - `flush`: Clear all local list data
//! - `purge`: Drop expired full hashes
//! - `status`: Show schedule and held chunks
//!
//! ## Example
//!
//! ```bash
//! # One update, honouring the server's requested delay
//! shavar-sync --config shavar.toml update
//!
//! # Update now, even if the schedule says to wait
//! shavar-sync --config shavar.toml update --force
//!
//! # Inspect local state
//! shavar-sync --config shavar.toml status --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shavar_client::{unix_now, HttpTransport, SyncEngine};
use shavar_store::SqliteChunkStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::{flush, purge, run, status, update};
use config::Config;

/// Keep shavar threat lists in sync.
#[derive(Parser, Debug)]
#[command(name = "shavar-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides storage.database)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one update cycle
    Update {
        /// Ignore the retry schedule
        #[arg(long)]
        force: bool,
    },

    /// Keep updating on a schedule until Ctrl-C
    Run,

    /// Clear all local list data and the retry schedule
    Flush,

    /// Drop full hashes that are no longer trusted
    Purge,

    /// Show schedule and held chunks
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    // Determine database path
    let db_path = match cli.database.clone().or_else(|| config.storage.database.clone()) {
        Some(path) => path,
        None => default_database_path()?,
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create data directory")?;
    }

    let store = Arc::new(
        SqliteChunkStore::new(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?,
    );

    match cli.command {
        Commands::Update { force } => {
            let engine = build_engine(&config, store)?;
            update::run(&engine, force).await?;
        }
        Commands::Run => {
            let engine = Arc::new(build_engine(&config, store)?);
            run::run(engine, config.runner_config()).await?;
        }
        Commands::Flush => {
            flush::run(store.as_ref()).await?;
        }
        Commands::Purge => {
            purge::run(store, unix_now()).await?;
        }
        Commands::Status { json } => {
            status::run(store.as_ref(), &config.list_names(), json).await?;
        }
    }

    Ok(())
}

/// Engine over the real HTTP transport.
fn build_engine(
    config: &Config,
    store: Arc<SqliteChunkStore>,
) -> Result<SyncEngine<HttpTransport, SqliteChunkStore>> {
    let sync_config = config.sync_config();
    let transport =
        HttpTransport::new(sync_config.request_timeout).context("Failed to build HTTP client")?;
    Ok(SyncEngine::new(sync_config, transport, store))
}

/// Logs go to stderr so `status --json` output stays parseable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Get the default database path for shavar-sync.
fn default_database_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "shavar", "shavar-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().join("shavar.db"))
}
