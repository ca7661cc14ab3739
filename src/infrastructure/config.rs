//! Configuration infrastructure
//!
//! Settings are layered in this order, later sources winning:
//! 1. Built-in defaults (the `defaults` module)
//! 2. An optional TOML/JSON/YAML file
//! 3. Environment variables prefixed `VNSYNC`, nested with `__`
//!    (e.g. `VNSYNC__DATABASE__URL=sqlite:/tmp/vn.db`)

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync_engine::driver::SyncSettings;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VNSYNC";

/// Directory name under the user's local data dir
pub const APP_DIR_NAME: &str = "vn-catalog-sync";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Remote catalog API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Kana API root, without a trailing slash
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite:/var/lib/vn/catalog.db`
    pub url: String,
}

/// Sync loop tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub checkpoint_path: PathBuf,
    pub window_size: u32,
    pub throttle_ms: u64,
    pub fetch_retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_followup_fetches: u32,
    /// 0 disables the stall guard
    pub max_consecutive_empty_windows: u32,
    pub description_placeholder: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for log files; defaults to `logs/` under the data dir
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Keep only the most recent log file (delete all others)
    pub keep_only_latest: bool,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::REMOTE_BASE_URL.to_string(),
            user_agent: defaults::user_agent(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: format!("sqlite:{}", data_dir().join(defaults::DATABASE_FILE).display()),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: data_dir().join(defaults::CHECKPOINT_FILE),
            window_size: defaults::WINDOW_SIZE,
            throttle_ms: defaults::THROTTLE_MS,
            fetch_retry_attempts: defaults::FETCH_RETRY_ATTEMPTS,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            max_followup_fetches: defaults::MAX_FOLLOWUP_FETCHES,
            max_consecutive_empty_windows: defaults::MAX_CONSECUTIVE_EMPTY_WINDOWS,
            description_placeholder: defaults::DESCRIPTION_PLACEHOLDER.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            keep_only_latest: defaults::LOG_KEEP_ONLY_LATEST,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl LoggingConfig {
    pub fn resolved_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| data_dir().join("logs"))
    }
}

impl AppConfig {
    /// Load defaults, then `path` if given, then `VNSYNC__*` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sync loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };

        if self.remote.base_url.trim().is_empty() {
            return fail("remote.base_url must not be empty");
        }
        if self.remote.max_requests_per_second == 0 {
            return fail("remote.max_requests_per_second must be at least 1");
        }
        if self.remote.timeout_seconds == 0 {
            return fail("remote.timeout_seconds must be at least 1");
        }
        if self.database.url.trim().is_empty() {
            return fail("database.url must not be empty");
        }
        if !(1..=defaults::WINDOW_SIZE).contains(&self.sync.window_size) {
            return Err(ConfigError::Validation {
                message: format!(
                    "sync.window_size must be between 1 and {}, got {}",
                    defaults::WINDOW_SIZE,
                    self.sync.window_size
                ),
            });
        }
        if self.sync.fetch_retry_attempts == 0 {
            return fail("sync.fetch_retry_attempts must be at least 1");
        }
        if self.sync.retry_base_delay_ms > self.sync.retry_max_delay_ms {
            return fail("sync.retry_base_delay_ms cannot be greater than sync.retry_max_delay_ms");
        }
        if self.sync.checkpoint_path.as_os_str().is_empty() {
            return fail("sync.checkpoint_path must not be empty");
        }
        if !self.logging.console_output && !self.logging.file_output {
            return fail("logging needs console_output or file_output enabled");
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            window_size: self.sync.window_size,
            throttle: Duration::from_millis(self.sync.throttle_ms),
            fetch_retry_attempts: self.sync.fetch_retry_attempts,
            retry_base_delay: Duration::from_millis(self.sync.retry_base_delay_ms),
            retry_max_delay: Duration::from_millis(self.sync.retry_max_delay_ms),
            retry_jitter: true,
            max_followup_fetches: self.sync.max_followup_fetches,
            max_consecutive_empty_windows: self.sync.max_consecutive_empty_windows,
            description_placeholder: self.sync.description_placeholder.clone(),
        }
    }
}

/// Root for the database, checkpoint and logs when not configured
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Default configuration values
pub mod defaults {
    use crate::domain::catalog_record::DEFAULT_DESCRIPTION_PLACEHOLDER;
    use crate::domain::window::MAX_WINDOW_SIZE;
    use crate::sync_engine::driver::DEFAULT_MAX_CONSECUTIVE_EMPTY_WINDOWS;
    use crate::sync_engine::reconciler::DEFAULT_MAX_FOLLOWUP_FETCHES;
    use crate::sync_engine::retry::{
        DEFAULT_FETCH_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
    };
    use crate::sync_engine::throttle::DEFAULT_THROTTLE_MS;

    pub const REMOTE_BASE_URL: &str = "https://api.vndb.org/kana";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Kana allows 200 requests per 5 minutes; stay well below it
    pub const MAX_REQUESTS_PER_SECOND: u32 = 1;

    pub const DATABASE_FILE: &str = "catalog.db";

    pub const CHECKPOINT_FILE: &str = "checkpoint.json";

    pub const WINDOW_SIZE: u32 = MAX_WINDOW_SIZE;
    pub const THROTTLE_MS: u64 = DEFAULT_THROTTLE_MS;
    pub const FETCH_RETRY_ATTEMPTS: u32 = DEFAULT_FETCH_RETRY_ATTEMPTS;
    pub const RETRY_BASE_DELAY_MS: u64 = DEFAULT_RETRY_BASE_DELAY_MS;
    pub const RETRY_MAX_DELAY_MS: u64 = DEFAULT_RETRY_MAX_DELAY_MS;
    pub const MAX_FOLLOWUP_FETCHES: u32 = DEFAULT_MAX_FOLLOWUP_FETCHES;
    pub const MAX_CONSECUTIVE_EMPTY_WINDOWS: u32 = DEFAULT_MAX_CONSECUTIVE_EMPTY_WINDOWS;
    pub const DESCRIPTION_PLACEHOLDER: &str = DEFAULT_DESCRIPTION_PLACEHOLDER;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;
    pub const LOG_KEEP_ONLY_LATEST: bool = false;

    pub fn user_agent() -> String {
        format!("vn-catalog-sync/{}", env!("CARGO_PKG_VERSION"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.remote.base_url, "https://api.vndb.org/kana");
        assert_eq!(config.sync.window_size, 10);
        assert!(config.database.url.starts_with("sqlite:"));
        assert!(config.sync.checkpoint_path.ends_with("checkpoint.json"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vn-catalog-sync.toml");
        std::fs::write(
            &path,
            "[sync]\nwindow_size = 5\nthrottle_ms = 250\n\n[database]\nurl = \"sqlite:/tmp/vn-test.db\"\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.sync.window_size, 5);
        assert_eq!(config.sync.throttle_ms, 250);
        assert_eq!(config.sync.fetch_retry_attempts, 3);
        assert_eq!(config.database.url, "sqlite:/tmp/vn-test.db");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_oversized_window_is_rejected() {
        let mut config = AppConfig::default();
        config.sync.window_size = 25;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/vn-catalog-sync.toml")));
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn test_sync_settings_conversion() {
        let mut config = AppConfig::default();
        config.sync.throttle_ms = 1500;
        config.sync.max_consecutive_empty_windows = 0;

        let settings = config.sync_settings();
        assert_eq!(settings.throttle, Duration::from_millis(1500));
        assert_eq!(settings.max_consecutive_empty_windows, 0);
        assert_eq!(settings.window_size, 10);
    }
}
