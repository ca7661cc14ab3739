//! Infrastructure layer: SQLite storage, the VNDB HTTP client, the checkpoint
//! file, configuration and logging.

pub mod catalog_record_repository;
pub mod checkpoint_file;
pub mod config;
pub mod database_connection;
pub mod logging;
pub mod vndb_client;

pub use catalog_record_repository::SqliteRecordStore;
pub use checkpoint_file::JsonCheckpointFile;
pub use config::{AppConfig, ConfigError, LoggingConfig};
pub use database_connection::DatabaseConnection;
pub use logging::init_logging_with_config;
pub use vndb_client::VndbClient;
