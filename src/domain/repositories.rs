//! Collaborator interfaces for the sync engine
//!
//! Contains trait definitions for the remote catalog, the local record store
//! and the checkpoint store. Concrete adapters live in the infrastructure
//! layer; tests substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::catalog_record::{CatalogRecord, RemoteItem};
use crate::domain::checkpoint::SyncCheckpoint;
use crate::sync_engine::error::{CheckpointError, PersistenceError, RemoteError};

/// Remote catalog API.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Authoritative number of entries in the remote catalog.
    async fn count(&self) -> Result<u64, RemoteError>;

    /// Items for the requested codes. The result is an ascending subset of
    /// `codes`; a missing code means the entry does not exist remotely.
    async fn fetch_by_codes(&self, codes: &[u32]) -> Result<Vec<RemoteItem>, RemoteError>;
}

/// Local document store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count(&self) -> Result<u64, PersistenceError>;

    /// Insert records, absorbing per-record failures into the report.
    /// Only a store-level failure is returned as `Err`.
    async fn insert_many(&self, records: &[CatalogRecord]) -> Result<InsertReport, PersistenceError>;
}

/// Durable single-value checkpoint storage.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last saved checkpoint, or the default on cold start.
    async fn load(&self) -> Result<SyncCheckpoint, CheckpointError>;

    /// Overwrite the stored checkpoint.
    async fn save(&self, checkpoint: &SyncCheckpoint) -> Result<(), CheckpointError>;
}

/// Why a single record did not land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordFailureReason {
    /// A record with the same code is already stored
    Duplicate,
    /// Failed local validation before reaching the store
    Invalid(String),
    /// Refused by a store constraint other than uniqueness
    Rejected(String),
}

impl std::fmt::Display for RecordFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordFailureReason::Duplicate => write!(f, "duplicate code"),
            RecordFailureReason::Invalid(reason) => write!(f, "invalid record: {}", reason),
            RecordFailureReason::Rejected(reason) => write!(f, "rejected by store: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub code: u32,
    pub reason: RecordFailureReason,
}

/// Outcome of a partial-failure tolerant batch insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertReport {
    pub inserted: usize,
    pub failures: Vec<RecordFailure>,
}

impl InsertReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: InsertReport) {
        self.inserted += other.inserted;
        self.failures.extend(other.failures);
    }

    pub fn duplicates(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.reason == RecordFailureReason::Duplicate)
            .count()
    }
}
