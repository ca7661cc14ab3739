//! # Sync Engine Module
//!
//! Catch-up synchronization from the remote catalog into the local store.
//! - `reconciler`: fetches one window and classifies each code as found or gap
//! - `persistence`: partial-failure tolerant batch writes
//! - `throttle` / `retry`: pacing between windows and around failed fetches
//! - `driver`: the state machine that ties them together per `run_once` pass

pub mod driver;
pub mod error;
pub mod persistence;
pub mod reconciler;
pub mod retry;
pub mod throttle;

pub use driver::{SyncDriver, SyncDriverBuilder, SyncProgressCallback, SyncSettings};
pub use error::{CheckpointError, PersistenceError, RemoteError, SyncError};
pub use persistence::PersistenceStage;
pub use reconciler::{CodeGap, GapReason, Reconciler, WindowOutcome};
pub use retry::RetryPolicy;
pub use throttle::Throttle;
