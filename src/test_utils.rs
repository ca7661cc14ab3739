//! Test utilities for vn-catalog-sync
//!
//! Provides scriptable fakes for the remote catalog and the checkpoint store,
//! plus an isolated in-memory SQLite database, so sync tests run without
//! network or filesystem access.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::catalog_record::RemoteItem;
use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::repositories::{CatalogSource, CheckpointStore, RecordStore};
use crate::infrastructure::{DatabaseConnection, SqliteRecordStore};
use crate::sync_engine::error::{CheckpointError, RemoteError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct FakeCatalogState {
    items: BTreeMap<u32, RemoteItem>,
    count_override: Option<u64>,
    count_failures: VecDeque<RemoteError>,
    fetch_failures: VecDeque<RemoteError>,
    extra_items: Vec<RemoteItem>,
    fetch_calls: Vec<Vec<u32>>,
}

/// Remote catalog held in memory.
///
/// Answers fetches with the requested codes that exist, in ascending order,
/// optionally truncated to mimic a server-side page limit.
#[derive(Default)]
pub struct FakeCatalogSource {
    state: Mutex<FakeCatalogState>,
    truncate_to: Option<usize>,
}

impl FakeCatalogSource {
    pub fn with_codes(codes: impl IntoIterator<Item = u32>) -> Self {
        Self::with_items(codes.into_iter().map(|code| RemoteItem::titled(code, format!("Visual Novel {code}"))))
    }

    pub fn with_items(items: impl IntoIterator<Item = RemoteItem>) -> Self {
        let source = Self::default();
        lock(&source.state).items = items.into_iter().map(|item| (item.code, item)).collect();
        source
    }

    /// Cap every fetch response at `max_items`.
    pub fn truncate_responses(mut self, max_items: usize) -> Self {
        self.truncate_to = Some(max_items);
        self
    }

    /// Items appended to every fetch response whether requested or not.
    pub fn inject_extra_items(&self, items: Vec<RemoteItem>) {
        lock(&self.state).extra_items.extend(items);
    }

    /// The next fetches fail with these errors, in order.
    pub fn fail_next_fetches(&self, errors: Vec<RemoteError>) {
        lock(&self.state).fetch_failures.extend(errors);
    }

    /// The next count call fails with `error`.
    pub fn fail_count_with(&self, error: RemoteError) {
        lock(&self.state).count_failures.push_back(error);
    }

    /// Report `count` regardless of what the catalog holds.
    pub fn set_count(&self, count: u64) {
        lock(&self.state).count_override = Some(count);
    }

    pub fn add_codes(&self, codes: impl IntoIterator<Item = u32>) {
        let mut state = lock(&self.state);
        for code in codes {
            state
                .items
                .insert(code, RemoteItem::titled(code, format!("Visual Novel {code}")));
        }
    }

    /// Codes requested by each fetch so far.
    pub fn fetch_calls(&self) -> Vec<Vec<u32>> {
        lock(&self.state).fetch_calls.clone()
    }

    pub fn clear_fetch_calls(&self) {
        lock(&self.state).fetch_calls.clear();
    }
}

#[async_trait]
impl CatalogSource for FakeCatalogSource {
    async fn count(&self) -> Result<u64, RemoteError> {
        let mut state = lock(&self.state);
        if let Some(error) = state.count_failures.pop_front() {
            return Err(error);
        }
        Ok(state.count_override.unwrap_or(state.items.len() as u64))
    }

    async fn fetch_by_codes(&self, codes: &[u32]) -> Result<Vec<RemoteItem>, RemoteError> {
        let mut state = lock(&self.state);
        state.fetch_calls.push(codes.to_vec());
        if let Some(error) = state.fetch_failures.pop_front() {
            return Err(error);
        }

        let mut found: Vec<RemoteItem> = codes
            .iter()
            .filter_map(|code| state.items.get(code).cloned())
            .collect();
        found.sort_by_key(|item| item.code);
        if let Some(max_items) = self.truncate_to {
            found.truncate(max_items);
        }
        found.extend(state.extra_items.iter().cloned());
        Ok(found)
    }
}

#[derive(Default)]
struct CheckpointState {
    current: SyncCheckpoint,
    saved: Vec<SyncCheckpoint>,
    fail_saves: bool,
}

/// Checkpoint store that remembers every save.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    state: Mutex<CheckpointState>,
}

impl InMemoryCheckpointStore {
    pub fn new(initial: Option<SyncCheckpoint>) -> Self {
        let store = Self::default();
        lock(&store.state).current = initial.unwrap_or_default();
        store
    }

    pub fn fail_saves(&self, fail: bool) {
        lock(&self.state).fail_saves = fail;
    }

    /// Every checkpoint saved, oldest first.
    pub fn saved(&self) -> Vec<SyncCheckpoint> {
        lock(&self.state).saved.clone()
    }

    pub fn current(&self) -> SyncCheckpoint {
        lock(&self.state).current
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self) -> Result<SyncCheckpoint, CheckpointError> {
        Ok(lock(&self.state).current)
    }

    async fn save(&self, checkpoint: &SyncCheckpoint) -> Result<(), CheckpointError> {
        let mut state = lock(&self.state);
        if state.fail_saves {
            return Err(CheckpointError::Io {
                path: "memory://checkpoint".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        state.current = *checkpoint;
        state.saved.push(*checkpoint);
        Ok(())
    }
}

/// Test database configuration
pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// Create a new in-memory test database
    ///
    /// Each test gets a fresh, migrated database that no other test can see.
    pub async fn new() -> Result<Self> {
        let db = DatabaseConnection::new("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(Self { connection: db })
    }

    pub fn pool(&self) -> sqlx::Pool<sqlx::Sqlite> {
        self.connection.pool().clone()
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        Arc::new(SqliteRecordStore::new(self.pool()))
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}

#[macro_export]
macro_rules! test_db {
    () => {{
        $crate::test_utils::TestDatabase::new()
            .await
            .expect("Failed to create test database")
    }};
}
