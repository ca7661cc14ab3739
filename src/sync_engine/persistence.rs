//! # Persistence Stage
//!
//! Writes reconciled records with partial-failure semantics: invalid records
//! are filtered out before they reach the store, store-side rejections come
//! back in the report, and only a store-level failure aborts the batch.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::catalog_record::CatalogRecord;
use crate::domain::repositories::{InsertReport, RecordFailure, RecordFailureReason, RecordStore};
use crate::sync_engine::error::PersistenceError;

#[derive(Clone)]
pub struct PersistenceStage {
    store: Arc<dyn RecordStore>,
}

impl PersistenceStage {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Number of records currently persisted.
    pub async fn local_count(&self) -> Result<u64, PersistenceError> {
        self.store.count().await
    }

    /// Store `records`, reporting per-record failures as warnings.
    pub async fn insert_batch(&self, records: Vec<CatalogRecord>) -> Result<InsertReport, PersistenceError> {
        if records.is_empty() {
            return Ok(InsertReport::default());
        }

        let (valid, invalid): (Vec<_>, Vec<_>) = records
            .into_iter()
            .map(|record| {
                let verdict = record.validate();
                (record, verdict)
            })
            .partition(|(_, verdict)| verdict.is_ok());

        let mut report = InsertReport {
            inserted: 0,
            failures: invalid
                .into_iter()
                .map(|(record, verdict)| RecordFailure {
                    code: record.code,
                    reason: RecordFailureReason::Invalid(verdict.err().unwrap_or_default()),
                })
                .collect(),
        };

        let valid: Vec<CatalogRecord> = valid.into_iter().map(|(record, _)| record).collect();
        if !valid.is_empty() {
            report.merge(self.store.insert_many(&valid).await?);
        }

        for failure in &report.failures {
            warn!("⚠️ Record v{} not stored: {}", failure.code, failure.reason);
        }
        debug!(
            "💾 Batch persisted: {} inserted, {} failed ({} duplicates)",
            report.inserted,
            report.failures.len(),
            report.duplicates()
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog_record::RemoteItem;
    use crate::test_utils::TestDatabase;

    fn record(code: u32) -> CatalogRecord {
        RemoteItem::titled(code, format!("Title {code}")).into_record("-")
    }

    #[tokio::test]
    async fn test_duplicate_code_does_not_abort_batch() {
        let db = TestDatabase::new().await.unwrap();
        let stage = PersistenceStage::new(db.record_store());

        stage.insert_batch(vec![record(2)]).await.unwrap();
        let report = stage
            .insert_batch(vec![record(1), record(2), record(3)])
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(
            report.failures,
            vec![RecordFailure { code: 2, reason: RecordFailureReason::Duplicate }]
        );
        assert_eq!(stage.local_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_invalid_records_are_reported_not_stored() {
        let db = TestDatabase::new().await.unwrap();
        let stage = PersistenceStage::new(db.record_store());

        let mut blank = record(5);
        blank.title = String::new();
        let report = stage.insert_batch(vec![record(4), blank]).await.unwrap();

        assert_eq!(report.inserted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].code, 5);
        assert!(matches!(report.failures[0].reason, RecordFailureReason::Invalid(_)));
        assert_eq!(stage.local_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let db = TestDatabase::new().await.unwrap();
        let stage = PersistenceStage::new(db.record_store());
        db.close().await;

        let report = stage.insert_batch(Vec::new()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.inserted, 0);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_fatal() {
        let db = TestDatabase::new().await.unwrap();
        let stage = PersistenceStage::new(db.record_store());
        db.close().await;

        let result = stage.insert_batch(vec![record(1)]).await;
        assert!(matches!(result, Err(PersistenceError::Unreachable(_))));
    }
}
