//! vn-catalog-sync - resumable VNDB catalog mirror
//!
//! Mirrors the append-mostly VNDB visual novel catalog into a local SQLite
//! store. The sync engine scans codes strictly forward in bounded windows,
//! records gaps for codes that no longer exist remotely, and saves a
//! checkpoint after every window so any run can resume where the last one
//! stopped.

// Module declarations
pub mod domain;
pub mod sync_engine;
pub mod infrastructure;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the types a caller needs to wire up one sync pass
pub use domain::{CatalogRecord, RemoteItem, SyncCheckpoint, Window, WindowPlanner};
pub use domain::events::{SyncProgress, SyncState, SyncSummary};
pub use domain::repositories::{CatalogSource, CheckpointStore, RecordStore};
pub use sync_engine::{SyncDriver, SyncDriverBuilder, SyncError, SyncSettings};
