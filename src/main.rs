//! vn-catalog-sync binary: one catch-up pass, then exit.
//!
//! Exit status is 0 when the local store has caught up, 130 when interrupted
//! with Ctrl-C, and 1 for any other failure.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use vn_catalog_sync::infrastructure::{
    init_logging_with_config, AppConfig, DatabaseConnection, JsonCheckpointFile, SqliteRecordStore, VndbClient,
};
use vn_catalog_sync::{SyncDriver, SyncProgress};

#[derive(Parser, Debug)]
#[command(name = "vn-catalog-sync")]
#[command(about = "Catch up a local SQLite mirror of the VNDB visual novel catalog")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "VNSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database URL, overrides `database.url`
    #[arg(long)]
    database_url: Option<String>,

    /// Checkpoint file path, overrides `sync.checkpoint_path`
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Log level, overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
        if let Some(url) = &self.database_url {
            config.database.url.clone_from(url);
        }
        if let Some(path) = &self.checkpoint {
            config.sync.checkpoint_path.clone_from(path);
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = match init_logging_with_config(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<ExitCode> {
    info!("🗄️ Database: {}", config.database.url);

    let database = DatabaseConnection::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    database.migrate().await.context("Failed to prepare database schema")?;

    let source = VndbClient::new(&config.remote).context("Failed to create VNDB client")?;
    let store = SqliteRecordStore::new(database.pool().clone());
    let checkpoints = JsonCheckpointFile::new(&config.sync.checkpoint_path);
    info!("📍 Checkpoint: {}", checkpoints.path().display());

    match store.max_code().await.context("Failed to read the local store")? {
        Some(code) => info!("🗄️ Highest stored code: v{}", code),
        None => info!("🗄️ Local store is empty"),
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping after the current step");
            signal_token.cancel();
        }
    });

    let driver = SyncDriver::builder(Arc::new(source), Arc::new(store), Arc::new(checkpoints))
        .settings(config.sync_settings())
        .cancellation_token(cancel)
        .on_progress(log_progress)
        .build();

    let outcome = driver.run_once().await;
    database.close().await;

    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        // Already logged by the driver
        Err(e) => Ok(ExitCode::from(e.exit_code())),
    }
}

fn log_progress(progress: &SyncProgress) {
    info!(
        "📊 {:.1}% of remote catalog mirrored (remote {}, {} left before window {})",
        progress.percentage(),
        progress.remote_count,
        progress.remaining_before,
        progress.window
    );
}
