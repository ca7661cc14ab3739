//! Sync checkpoint value
//!
//! The checkpoint is the only state that survives between runs. It is a plain
//! value owned by the driver loop: loaded once, advanced after each window,
//! and handed to the checkpoint store to overwrite the previous one.

use serde::{Deserialize, Serialize};

use crate::domain::window::Window;

/// Resumable position of the forward scan.
///
/// Serialized with the on-disk field names `last_vn_id` / `error_count`.
/// Missing fields decode as zero so a partially written legacy file still
/// resumes instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Highest code whose window has been fully processed (0 = nothing yet)
    #[serde(rename = "last_vn_id", default)]
    pub last_processed_code: u32,

    /// Total gaps encountered across all runs
    #[serde(default)]
    pub error_count: u64,
}

impl SyncCheckpoint {
    pub fn new(last_processed_code: u32, error_count: u64) -> Self {
        Self {
            last_processed_code,
            error_count,
        }
    }

    /// True when no window has ever been recorded.
    pub fn is_cold(&self) -> bool {
        self.last_processed_code == 0 && self.error_count == 0
    }

    /// First code the next window should request.
    pub fn next_code(&self) -> u32 {
        self.last_processed_code.saturating_add(1)
    }

    /// Checkpoint after `window` completed with `gaps` missing codes.
    ///
    /// Gaps count as processed, so the scan always moves to the window's end.
    pub fn advance(&self, window: &Window, gaps: u64) -> Self {
        Self {
            last_processed_code: window.end_code(),
            error_count: self.error_count.saturating_add(gaps),
        }
    }
}

impl std::fmt::Display for SyncCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "last_vn_id={} error_count={}",
            self.last_processed_code, self.error_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_cold_start() {
        let checkpoint = SyncCheckpoint::default();
        assert!(checkpoint.is_cold());
        assert_eq!(checkpoint.next_code(), 1);
    }

    #[test]
    fn test_advance_moves_to_window_end_regardless_of_gaps() {
        let checkpoint = SyncCheckpoint::new(20, 1);
        let window = Window::new(21, 10);

        let advanced = checkpoint.advance(&window, 5);
        assert_eq!(advanced.last_processed_code, 30);
        assert_eq!(advanced.error_count, 6);

        let no_gaps = checkpoint.advance(&window, 0);
        assert_eq!(no_gaps.last_processed_code, 30);
        assert_eq!(no_gaps.error_count, 1);
    }

    #[test]
    fn test_serializes_with_legacy_field_names() {
        let json = serde_json::to_value(SyncCheckpoint::new(12, 2)).unwrap();
        assert_eq!(json, serde_json::json!({ "last_vn_id": 12, "error_count": 2 }));
    }

    #[test]
    fn test_missing_fields_decode_as_zero() {
        let only_id: SyncCheckpoint = serde_json::from_str(r#"{"last_vn_id": 7}"#).unwrap();
        assert_eq!(only_id, SyncCheckpoint::new(7, 0));

        let empty: SyncCheckpoint = serde_json::from_str("{}").unwrap();
        assert!(empty.is_cold());
    }
}
