//! bookplayer-ingest - audiobook ingest service
//!
//! Watches the inbox directory and runs every new or changed audiobook
//! through the pipeline until interrupted.
//!
//! **Signals:**
//! - `SIGINT` / `SIGTERM`: graceful shutdown (fingerprint table is saved)
//! - `SIGUSR1`: scan the inbox now

use anyhow::{Context, Result};
use bookplayer_common::config::{load_config, write_toml_config, ConfigSource, TomlConfig};
use bookplayer_common::db::init_database;
use bookplayer_ingest::config::{IngestConfig, Overrides};
use bookplayer_ingest::db::SqliteAudiobookStore;
use bookplayer_ingest::pipeline::{PipelineHandle, PipelineOrchestrator, StageCommand};
use bookplayer_ingest::services::{
    AudiobookSink, ChapterSplitter, DirectoryWatcher, FfmpegSegmenter, FfprobeProbe,
    FingerprintStore, MetadataExtractor,
};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bookplayer-ingest
#[derive(Parser, Debug)]
#[command(name = "bookplayer-ingest")]
#[command(about = "Audiobook ingest pipeline for bookplayer")]
#[command(version)]
struct Args {
    /// Configuration file (default: BOOKPLAYER_CONFIG, then the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory watched for new audiobooks
    #[arg(long, env = "BOOKPLAYER_AUDIOBOOK_DIR")]
    audiobook_dir: Option<PathBuf>,

    /// Directory for processed output, database and watcher state
    #[arg(long, env = "BOOKPLAYER_APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Seconds between scans
    #[arg(long, env = "BOOKPLAYER_SCAN_INTERVAL")]
    scan_interval: Option<u64>,

    /// Write a configuration file with default values to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            audiobook_directory: self.audiobook_dir.clone(),
            application_directory: self.app_dir.clone(),
            scan_interval_secs: self.scan_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let loaded = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let level = loaded.config.logging.level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bookplayer_ingest={level},bookplayer_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting bookplayer-ingest {} ({} built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match (&loaded.path, loaded.source) {
        (Some(path), Some(source)) => {
            info!(path = %path.display(), ?source, "Configuration loaded");
        }
        (None, Some(ConfigSource::PlatformDefault)) => {
            warn!("No configuration file in the platform config directory; using defaults");
        }
        _ => warn!("No configuration directory available; using defaults"),
    }

    let config = IngestConfig::resolve(&loaded.config, &args.overrides())
        .context("Invalid configuration")?;
    info!("Inbox: {}", config.audiobook_directory.display());
    info!("Processed: {}", config.processed_directory.display());
    info!("Database: {}", config.database_path.display());

    // External tools and storage must all be usable before any stage starts
    let probe = FfprobeProbe::detect()
        .await
        .context("ffprobe is required for metadata extraction")?;
    let segmenter = FfmpegSegmenter::detect()
        .await
        .context("ffmpeg is required for chapter splitting")?;

    let pool = init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let watcher = DirectoryWatcher::new(
        &config.audiobook_directory,
        &config.media_extension,
        FingerprintStore::new(&config.fingerprint_store),
    )
    .context("Failed to initialize directory watcher")?;
    let extractor = MetadataExtractor::new(probe);
    let splitter = ChapterSplitter::new(segmenter, &config.processed_directory)
        .context("Failed to create processed directory")?;
    let sink = AudiobookSink::new(SqliteAudiobookStore::new(pool));

    let handle = PipelineOrchestrator::new(watcher, extractor, splitter, sink, config.scan_interval)
        .start(CancellationToken::new());

    serve_signals(&handle).await?;

    let report = handle.shutdown().await;
    for stage in &report.stages {
        info!(
            stage = stage.stage,
            processed = stage.items_processed,
            failed = stage.items_failed,
            commands = stage.commands_processed,
            "Stage summary"
        );
    }
    info!(
        persisted = report.audiobooks_persisted,
        scans = report.scans_triggered,
        commands = report.commands_routed,
        "Shutdown complete"
    );

    Ok(())
}

/// Forward SIGUSR1 as a scan request until a shutdown signal arrives
#[cfg(unix)]
async fn serve_signals(handle: &PipelineHandle) -> Result<()> {
    use signal::unix::{signal as unix_signal, SignalKind};
    use tokio::sync::mpsc::error::TrySendError;

    let mut terminate =
        unix_signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut user1 =
        unix_signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("Received terminate signal, shutting down");
                return Ok(());
            }
            _ = user1.recv() => {
                info!("Received SIGUSR1, requesting scan");
                match handle.try_send_command(StageCommand::scan()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Pipeline busy with earlier commands; scan request dropped");
                    }
                    Err(TrySendError::Closed(_)) => warn!("Pipeline no longer accepts commands"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn serve_signals(_handle: &PipelineHandle) -> Result<()> {
    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");
    Ok(())
}
