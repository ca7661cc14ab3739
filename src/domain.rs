//! Domain module - Core sync entities and collaborator contracts
//!
//! This module contains the values the sync engine threads through a run
//! (checkpoint, window, records) and the traits its external collaborators
//! implement.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod catalog_record;
pub mod checkpoint;
pub mod events;
pub mod repositories;
pub mod window;

// Re-export commonly used items for convenience
pub use catalog_record::{CatalogRecord, RemoteItem, DEFAULT_DESCRIPTION_PLACEHOLDER};
pub use checkpoint::SyncCheckpoint;
pub use events::{SyncProgress, SyncState, SyncSummary};
pub use repositories::{CatalogSource, CheckpointStore, InsertReport, RecordFailure, RecordFailureReason, RecordStore};
pub use window::{Window, WindowPlanner, MAX_WINDOW_SIZE};
