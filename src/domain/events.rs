//! Progress and summary types emitted by the sync driver
//!
//! The driver never renders progress itself. It hands a `SyncProgress` to an
//! optional callback after each window and returns a `SyncSummary` at the end
//! of the run; presentation is the caller's business.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::window::Window;

/// Driver loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Loading the checkpoint and deciding where to resume
    ColdStart,
    /// Processing windows until the counts converge
    Looping,
    /// Remote and local counts converged
    Done,
    /// Run aborted; saved state is still consistent
    Fatal,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::ColdStart => write!(f, "cold-start"),
            SyncState::Looping => write!(f, "looping"),
            SyncState::Done => write!(f, "done"),
            SyncState::Fatal => write!(f, "fatal"),
        }
    }
}

/// Emitted once per completed window, after its checkpoint is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub window: Window,
    /// Records that landed in the store for this window
    pub inserted: usize,
    /// Records not stored: failed validation, duplicate code or another store constraint
    pub failed: usize,
    /// Codes found missing remotely
    pub gaps: usize,
    /// Remote count minus local count before this window
    pub remaining_before: u64,
    pub remote_count: u64,
    pub checkpoint: SyncCheckpoint,
}

impl SyncProgress {
    /// Share of the remote catalog mirrored locally, 0.0..=100.0.
    pub fn percentage(&self) -> f64 {
        if self.remote_count == 0 {
            return 100.0;
        }
        let local_after = self
            .remote_count
            .saturating_sub(self.remaining_before)
            .saturating_add(self.inserted as u64);
        (local_after as f64 / self.remote_count as f64 * 100.0).min(100.0)
    }
}

/// Totals for one `run_once` pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub final_state: SyncState,
    pub windows_processed: u64,
    pub records_added: u64,
    pub record_failures: u64,
    pub gaps: u64,
    pub fetch_retries: u64,
    pub start_checkpoint: SyncCheckpoint,
    pub final_checkpoint: SyncCheckpoint,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl SyncSummary {
    pub fn new(start_checkpoint: SyncCheckpoint) -> Self {
        Self {
            final_state: SyncState::ColdStart,
            windows_processed: 0,
            records_added: 0,
            record_failures: 0,
            gaps: 0,
            fetch_retries: 0,
            start_checkpoint,
            final_checkpoint: start_checkpoint,
            elapsed: Duration::ZERO,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
