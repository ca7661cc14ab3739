//! SQLite-backed record store
//!
//! One row per catalog code in `catalog_records`. Batch inserts run inside a
//! single transaction with one statement per record; SQLite aborts only the
//! failing statement on a constraint violation, so the rest of the batch
//! still commits.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::error::ErrorKind;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::catalog_record::CatalogRecord;
use crate::domain::repositories::{InsertReport, RecordFailure, RecordFailureReason, RecordStore};
use crate::sync_engine::error::PersistenceError;

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: Arc<SqlitePool>,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Highest stored code, if any.
    pub async fn max_code(&self) -> Result<Option<u32>, PersistenceError> {
        let row = sqlx::query("SELECT MAX(code) AS max_code FROM catalog_records")
            .fetch_one(&*self.pool)
            .await
            .map_err(store_error)?;
        let max: Option<i64> = row.try_get("max_code").map_err(store_error)?;
        Ok(max.map(|code| code as u32))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn count(&self) -> Result<u64, PersistenceError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM catalog_records")
            .fetch_one(&*self.pool)
            .await
            .map_err(store_error)?;
        let total: i64 = row.try_get("total").map_err(store_error)?;
        Ok(total.max(0) as u64)
    }

    async fn insert_many(&self, records: &[CatalogRecord]) -> Result<InsertReport, PersistenceError> {
        let mut report = InsertReport::default();
        if records.is_empty() {
            return Ok(report);
        }

        let synced_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for record in records {
            let aliases = record
                .aliases
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| PersistenceError::Query(e.to_string()))?;

            let result = sqlx::query(
                r#"
                INSERT INTO catalog_records
                (code, title, aliases, length, rating, description, image_url, synced_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(record.code as i64)
            .bind(&record.title)
            .bind(aliases)
            .bind(record.length)
            .bind(record.rating)
            .bind(&record.description)
            .bind(&record.image_url)
            .bind(&synced_at)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => report.inserted += 1,
                Err(sqlx::Error::Database(db_error)) => {
                    let reason = match db_error.kind() {
                        ErrorKind::UniqueViolation => RecordFailureReason::Duplicate,
                        _ => RecordFailureReason::Rejected(db_error.message().to_string()),
                    };
                    report.failures.push(RecordFailure {
                        code: record.code,
                        reason,
                    });
                }
                Err(e) => return Err(store_error(e)),
            }
        }

        tx.commit().await.map_err(store_error)?;
        debug!(
            "Inserted {} of {} records into catalog_records",
            report.inserted,
            records.len()
        );
        Ok(report)
    }
}

fn store_error(error: sqlx::Error) -> PersistenceError {
    match error {
        sqlx::Error::Database(db_error) => PersistenceError::Query(db_error.message().to_string()),
        sqlx::Error::ColumnNotFound(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            PersistenceError::Query(error.to_string())
        }
        other => PersistenceError::Unreachable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog_record::RemoteItem;
    use crate::test_utils::TestDatabase;

    fn store(db: &TestDatabase) -> SqliteRecordStore {
        SqliteRecordStore::new(db.pool())
    }

    async fn find_by_code(store: &SqliteRecordStore, code: u32) -> Option<CatalogRecord> {
        let row = sqlx::query(
            "SELECT code, title, aliases, length, rating, description, image_url FROM catalog_records WHERE code = ?",
        )
        .bind(i64::from(code))
        .fetch_optional(&*store.pool)
        .await
        .unwrap()?;

        let aliases: Option<String> = row.get("aliases");
        Some(CatalogRecord {
            code: row.get::<i64, _>("code") as u32,
            title: row.get("title"),
            aliases: aliases.map(|json| serde_json::from_str(&json).unwrap()),
            length: row.get("length"),
            rating: row.get("rating"),
            description: row.get("description"),
            image_url: row.get("image_url"),
        })
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = TestDatabase::new().await.unwrap();
        let store = store(&db);

        let mut item = RemoteItem::titled(17, "Ever17");
        item.aliases = Some(vec!["E17".to_string()]);
        item.rating = Some(8.4);
        item.image_url = Some("https://t.vndb.org/cv/17.jpg".to_string());
        let record = item.into_record("No description available.");

        let report = store.insert_many(&[record.clone()]).await.unwrap();
        assert_eq!(report.inserted, 1);

        assert_eq!(find_by_code(&store, 17).await, Some(record));
        assert_eq!(find_by_code(&store, 18).await, None);
        assert_eq!(store.max_code().await.unwrap(), Some(17));
    }

    #[tokio::test]
    async fn test_duplicate_is_reported_and_rest_commits() {
        let db = TestDatabase::new().await.unwrap();
        let store = store(&db);
        let records: Vec<CatalogRecord> = [1, 2, 2, 3]
            .into_iter()
            .map(|code| RemoteItem::titled(code, "t").into_record("-"))
            .collect();

        let report = store.insert_many(&records).await.unwrap();

        assert_eq!(report.inserted, 3);
        assert_eq!(report.duplicates(), 1);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_check_constraint_is_rejected_not_fatal() {
        let db = TestDatabase::new().await.unwrap();
        let store = store(&db);
        let mut blank = RemoteItem::titled(5, "x").into_record("-");
        blank.title = "   ".to_string();

        let report = store.insert_many(&[blank]).await.unwrap();

        assert_eq!(report.inserted, 0);
        assert!(matches!(report.failures[0].reason, RecordFailureReason::Rejected(_)));
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = TestDatabase::new().await.unwrap();
        let store = store(&db);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.max_code().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unreachable() {
        let db = TestDatabase::new().await.unwrap();
        let store = store(&db);
        db.close().await;

        assert!(matches!(store.count().await, Err(PersistenceError::Unreachable(_))));
    }
}
