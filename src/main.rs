use anyhow::{Context, Result};
use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use feedgather::config::{Config, LoggingConfig};
use feedgather::feed::FeedFetcher;
use feedgather::ingest::{Scheduler, Shutdown, ShutdownHandle};
use feedgather::storage::{Database, StoreError};

#[derive(Parser, Debug)]
#[command(name = "feedgather", about = "Periodically ingest RSS/Atom/JSON feeds into SQLite")]
struct Args {
    /// Configuration file (missing file means defaults)
    #[arg(long, value_name = "FILE", default_value = "feedgather.toml")]
    config: PathBuf,

    /// Database path, overrides `database_path` from the config file
    #[arg(long, value_name = "PATH")]
    database: Option<PathBuf>,

    /// Run a single ingestion pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loaded = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(database) = args.database {
        loaded.config.database_path = database;
    }

    init_tracing(&loaded.config.logging)?;
    loaded.log_summary(&args.config);
    let config = loaded.config;

    let db_path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path).await {
        Ok(db) => db,
        Err(StoreError::Locked) => {
            anyhow::bail!(
                "Database '{}' is locked by another process. Stop it and try again.",
                config.database_path.display()
            );
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    let fetcher = FeedFetcher::new(&config.fetcher).context("Failed to build HTTP client")?;
    let scheduler = Scheduler::new(db, fetcher, &config.gatherer);

    let (handle, shutdown) = Shutdown::new();
    tokio::spawn(watch_signals(handle));

    if args.once {
        let report = scheduler.perform_one_pass(&shutdown).await;
        println!(
            "Processed {} channels: {} ok, {} failed, {} new entries, {} updated",
            report.channels,
            report.succeeded,
            report.failed,
            report.items.created,
            report.items.updated
        );
    } else {
        scheduler.run(shutdown).await;
    }

    Ok(())
}

/// Install the global subscriber: stdout always, plus the optional log files.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level '{}'", logging.level))?;

    let info_layer = match &logging.info_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log(path)?)),
        ),
        None => None,
    };
    let error_layer = match &logging.error_log {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log(path)?).with_max_level(Level::ERROR)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(info_layer)
        .with(error_layer)
        .init();
    Ok(())
}

fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Trigger shutdown on SIGINT or SIGTERM. The running pass drains first.
async fn watch_signals(handle: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Received Ctrl+C, shutting down gracefully");
    }

    handle.trigger();
}
