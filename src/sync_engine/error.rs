//! Error taxonomy for the sync engine
//!
//! Gaps are not errors here: they are resolved inside reconciliation and
//! show up as `CodeGap` values. Per-record store failures are absorbed into
//! `InsertReport`. Everything in this module is either retried within a
//! budget or ends the run.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::window::Window;

/// Failure talking to the remote catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed remote response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Transport failures, rate limiting and server errors may succeed on a
    /// later attempt. A malformed response never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            RemoteError::Malformed(_) => false,
        }
    }
}

/// Store-level failure. Individual record rejections never use this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Store query failed: {0}")]
    Query(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint file {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Failed to encode checkpoint: {0}")]
    Encode(String),
}

/// Reasons a `run_once` pass ends in the fatal state.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote catalog error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Window {window} failed after {attempts} attempts: {source}")]
    FetchRetriesExhausted {
        window: Window,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("Persistence failure: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Scan stalled after {empty_windows} consecutive windows without records (checkpoint {checkpoint}, remaining {remaining})")]
    Stalled {
        empty_windows: u32,
        checkpoint: SyncCheckpoint,
        remaining: u64,
    },

    #[error("Sync cancelled at checkpoint {checkpoint}")]
    Cancelled { checkpoint: SyncCheckpoint },
}

impl SyncError {
    /// Process exit code for the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Cancelled { .. } => 130,
            _ => 1,
        }
    }
}
