// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        if !in_memory {
            // Create database file directory if it doesn't exist
            let db_path = database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let mut options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool_options = if in_memory {
            // Every connection to :memory: opens its own empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(10)
        };

        let pool = pool_options.connect_with(options).await?;
        debug!("Connected to {}", database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_records_sql = r#"
            CREATE TABLE IF NOT EXISTS catalog_records (
                code INTEGER PRIMARY KEY CHECK (code > 0),
                title TEXT NOT NULL CHECK (length(trim(title)) > 0),
                aliases TEXT,
                length REAL,
                rating REAL,
                description TEXT NOT NULL,
                image_url TEXT,
                synced_at TEXT NOT NULL
            )
        "#;

        let create_indexes_sql = r#"
            CREATE INDEX IF NOT EXISTS idx_catalog_records_synced_at ON catalog_records (synced_at);
        "#;

        sqlx::query(create_records_sql).execute(&self.pool).await?;
        sqlx::query(create_indexes_sql).execute(&self.pool).await?;

        info!("🗄️ Database schema ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("catalog.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;

        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration_is_repeatable() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("test_migration.db");
        let database_url = format!("sqlite:{}", db_path.display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='catalog_records'")
            .fetch_optional(db.pool())
            .await?;

        assert!(result.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_database_keeps_schema_across_queries() -> Result<()> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;

        for _ in 0..3 {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM catalog_records")
                .fetch_one(db.pool())
                .await?;
            assert_eq!(count, 0);
        }
        Ok(())
    }
}
