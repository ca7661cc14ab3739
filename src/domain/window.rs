//! Window planning
//!
//! A window is the contiguous range of codes requested in one iteration of
//! the driver loop. It is derived from the checkpoint and the remaining count
//! and never persisted.

use serde::{Deserialize, Serialize};

use crate::domain::checkpoint::SyncCheckpoint;

/// Upper bound on codes per window; matches the remote API's practical batch size.
pub const MAX_WINDOW_SIZE: u32 = 10;

/// Contiguous candidate range `[start_code, start_code + size - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start_code: u32,
    pub size: u32,
}

impl Window {
    pub fn new(start_code: u32, size: u32) -> Self {
        Self { start_code, size }
    }

    /// Last code covered by the window.
    pub fn end_code(&self) -> u32 {
        self.start_code
            .saturating_add(self.size)
            .saturating_sub(1)
    }

    /// Requested codes in ascending order.
    pub fn codes(&self) -> Vec<u32> {
        (self.start_code..=self.end_code()).collect()
    }

    pub fn contains(&self, code: u32) -> bool {
        (self.start_code..=self.end_code()).contains(&code)
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}-{}]", self.start_code, self.end_code())
    }
}

/// Proposes the next window from a checkpoint and the remaining count.
#[derive(Debug, Clone, Copy)]
pub struct WindowPlanner {
    max_size: u32,
}

impl Default for WindowPlanner {
    fn default() -> Self {
        Self {
            max_size: MAX_WINDOW_SIZE,
        }
    }
}

impl WindowPlanner {
    /// Planner with a custom cap, clamped to `1..=MAX_WINDOW_SIZE`.
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size: max_size.clamp(1, MAX_WINDOW_SIZE),
        }
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Next window, or `None` once nothing remains.
    pub fn plan(&self, checkpoint: &SyncCheckpoint, remaining: u64) -> Option<Window> {
        if remaining == 0 {
            return None;
        }
        // remaining is bounded by max_size here, so the narrowing cannot truncate
        let size = remaining.min(u64::from(self.max_size)) as u32;
        Some(Window::new(checkpoint.next_code(), size))
    }
}
