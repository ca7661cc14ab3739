//! Logging system configuration and initialization
//!
//! This module provides the logging setup for the sync binary:
//! - Console output and an optional non-blocking file writer
//! - Configuration file based log level control, overridable with `RUST_LOG`
//! - Structured JSON file logs (optional)
//! - Rotation of the previous run's log file and cleanup of old ones

#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Result};
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub use crate::infrastructure::config::LoggingConfig;

/// Log file written by the current run
pub const LOG_FILE_NAME: &str = "vn-catalog-sync.log";

/// Build the filter used when `RUST_LOG` is not set.
///
/// Dependency targets from `module_filters` are applied unless the
/// configured level is `trace`, in which case everything is shown.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level {:?}: {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        let mut targets: Vec<_> = config.module_filters.iter().collect();
        targets.sort();
        for (target, level) in targets {
            let directive = format!("{}={}", target, level)
                .parse::<Directive>()
                .map_err(|e| anyhow!("Invalid module filter {}={}: {}", target, level, e))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// Returns the file writer's guard when file output is enabled; the caller
/// must keep it alive until exit or buffered lines are lost.
///
/// ```bash
/// # Show SQL statements even at info level
/// RUST_LOG="info,sqlx::query=debug" vn-catalog-sync
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_env_filter(config)?,
    };

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_target(false)
    });

    let mut guard = None;
    let (json_file_layer, plain_file_layer) = if config.file_output {
        let log_dir = config.resolved_log_dir();
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        prepare_log_dir(&log_dir, config)?;

        let (file_writer, file_guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        guard = Some(file_guard);

        if config.json_format {
            let layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            (Some(layer), None)
        } else {
            // time + level + message only
            let layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_target(false)
                .with_ansi(false);
            (None, Some(layer))
        }
    } else {
        (None, None)
    };

    if console_layer.is_none() && guard.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(json_file_layer)
        .with(plain_file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    info!("Logging system initialized (level: {})", config.level);
    if config.file_output {
        info!("Log directory: {:?}", config.resolved_log_dir());
    }

    Ok(guard)
}

/// Rotate the previous log and prune old ones, leaving room for the file
/// this run is about to open.
fn prepare_log_dir(log_dir: &Path, config: &LoggingConfig) -> Result<()> {
    rotate_existing_log_file(log_dir, LOG_FILE_NAME)?;
    if config.auto_cleanup_logs {
        cleanup_old_logs(log_dir, config, 1)?;
    }
    Ok(())
}

/// Rename the previous run's log file with its modification timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<()> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: chrono::DateTime<chrono::Utc> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(())
}

/// Clean up old log files based on configuration
///
/// `reserved` slots of the configured limit are held back for files that do
/// not exist yet.
fn cleanup_old_logs(log_dir: &Path, config: &LoggingConfig, reserved: usize) -> Result<usize> {
    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".log"));

        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let limit = if config.keep_only_latest {
        1
    } else {
        config.max_files as usize
    };
    let keep = limit.saturating_sub(reserved);

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str, age_secs: u64) {
        let path = dir.join(name);
        std::fs::write(&path, b"line\n").unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn test_env_filter_accepts_module_filters() {
        let config = LoggingConfig::default();
        assert!(build_env_filter(&config).is_ok());

        let bad = LoggingConfig {
            module_filters: [("sqlx".to_string(), "loud".to_string())].into_iter().collect(),
            ..LoggingConfig::default()
        };
        assert!(build_env_filter(&bad).is_err());
    }

    #[test]
    fn test_previous_log_is_rotated() {
        let dir = tempdir().unwrap();
        touch(dir.path(), LOG_FILE_NAME, 60);

        rotate_existing_log_file(dir.path(), LOG_FILE_NAME).unwrap();

        assert!(!dir.path().join(LOG_FILE_NAME).exists());
        let rotated: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(rotated.len(), 1);
    }

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = tempdir().unwrap();
        for (index, name) in ["a.log", "b.log", "c.log", "d.log"].iter().enumerate() {
            touch(dir.path(), name, 100 * (index as u64 + 1));
        }
        touch(dir.path(), "notes.txt", 1000);

        let config = LoggingConfig {
            max_files: 2,
            ..LoggingConfig::default()
        };
        let removed = cleanup_old_logs(dir.path(), &config, 0).unwrap();

        assert_eq!(removed, 2);
        assert!(dir.path().join("a.log").exists());
        assert!(dir.path().join("b.log").exists());
        assert!(!dir.path().join("d.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_keep_only_latest() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "old.log", 500);
        touch(dir.path(), "new.log", 5);

        let config = LoggingConfig {
            keep_only_latest: true,
            ..LoggingConfig::default()
        };
        cleanup_old_logs(dir.path(), &config, 0).unwrap();

        assert!(dir.path().join("new.log").exists());
        assert!(!dir.path().join("old.log").exists());
    }

    #[test]
    fn test_prepare_leaves_room_for_current_log() {
        let dir = tempdir().unwrap();
        touch(dir.path(), LOG_FILE_NAME, 10);
        touch(dir.path(), "vn-catalog-sync.20260101T000000.log", 300);
        touch(dir.path(), "vn-catalog-sync.20260102T000000.log", 200);
        touch(dir.path(), "vn-catalog-sync.20260103T000000.log", 100);

        let config = LoggingConfig {
            max_files: 3,
            ..LoggingConfig::default()
        };
        prepare_log_dir(dir.path(), &config).unwrap();
        // what the appender opens next
        std::fs::write(dir.path().join(LOG_FILE_NAME), b"").unwrap();

        let logs = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(logs, 3);
        assert!(dir.path().join("vn-catalog-sync.20260103T000000.log").exists());
    }

    #[test]
    fn test_keep_only_latest_counts_current_log() {
        let dir = tempdir().unwrap();
        touch(dir.path(), LOG_FILE_NAME, 10);
        touch(dir.path(), "old.log", 500);

        let config = LoggingConfig {
            keep_only_latest: true,
            ..LoggingConfig::default()
        };
        prepare_log_dir(dir.path(), &config).unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
