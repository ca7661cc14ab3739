//! Fetch-reconcile stage
//!
//! Requests one window from the remote catalog and walks the requested codes
//! and the returned items in lockstep. A requested code smaller than the next
//! returned item is a gap. Codes left uncovered after the response is
//! consumed are requested again, at most `max_followup_fetches` times.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::catalog_record::{CatalogRecord, DEFAULT_DESCRIPTION_PLACEHOLDER};
use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::repositories::CatalogSource;
use crate::domain::window::Window;
use crate::sync_engine::error::RemoteError;

/// Default number of follow-up fetches per window after the initial one.
pub const DEFAULT_MAX_FOLLOWUP_FETCHES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapReason {
    /// The remote answered and the code was not among the items
    AbsentRemotely,
    /// Follow-up budget ran out before the code was covered
    FollowupBudgetExhausted,
}

/// A requested code with no remote item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGap {
    pub code: u32,
    pub reason: GapReason,
}

/// Result of reconciling one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub window: Window,
    /// Found records in ascending code order
    pub records: Vec<CatalogRecord>,
    pub gaps: Vec<CodeGap>,
    /// Remote calls made, initial fetch included
    pub fetches: u32,
}

impl WindowOutcome {
    pub fn gap_count(&self) -> u64 {
        self.gaps.len() as u64
    }

    pub fn gap_codes(&self) -> Vec<u32> {
        self.gaps.iter().map(|gap| gap.code).collect()
    }

    /// Candidate checkpoint once the records are persisted.
    pub fn next_checkpoint(&self, current: &SyncCheckpoint) -> SyncCheckpoint {
        current.advance(&self.window, self.gap_count())
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    max_followup_fetches: u32,
    description_placeholder: String,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FOLLOWUP_FETCHES, DEFAULT_DESCRIPTION_PLACEHOLDER)
    }
}

impl Reconciler {
    pub fn new(max_followup_fetches: u32, description_placeholder: impl Into<String>) -> Self {
        Self {
            max_followup_fetches,
            description_placeholder: description_placeholder.into(),
        }
    }

    /// Resolve `window` into found records and gaps.
    ///
    /// A remote failure aborts the whole window; nothing partial is returned,
    /// so the caller can retry the window from scratch.
    pub async fn reconcile(
        &self,
        source: &dyn CatalogSource,
        window: &Window,
    ) -> Result<WindowOutcome, RemoteError> {
        let requested = window.codes();
        let mut cursor = 0usize;
        let mut records = Vec::with_capacity(requested.len());
        let mut gaps = Vec::new();
        let mut fetches = 0u32;

        while cursor < requested.len() {
            if fetches > self.max_followup_fetches {
                warn!(
                    "⚠️ Window {} still has {} uncovered codes after {} fetches; recording them as gaps",
                    window,
                    requested.len() - cursor,
                    fetches
                );
                gaps.extend(requested[cursor..].iter().map(|&code| CodeGap {
                    code,
                    reason: GapReason::FollowupBudgetExhausted,
                }));
                break;
            }

            let pending = &requested[cursor..];
            if fetches > 0 {
                debug!(
                    "🔁 Follow-up fetch {} for window {}: v{}..v{}",
                    fetches,
                    window,
                    pending[0],
                    pending[pending.len() - 1]
                );
            }

            let mut items = source.fetch_by_codes(pending).await?;
            fetches += 1;

            if items.is_empty() {
                gaps.extend(pending.iter().map(|&code| CodeGap {
                    code,
                    reason: GapReason::AbsentRemotely,
                }));
                break;
            }

            items.sort_by_key(|item| item.code);
            for item in items {
                while cursor < requested.len() && requested[cursor] < item.code {
                    gaps.push(CodeGap {
                        code: requested[cursor],
                        reason: GapReason::AbsentRemotely,
                    });
                    cursor += 1;
                }

                if cursor < requested.len() && requested[cursor] == item.code {
                    records.push(item.into_record(&self.description_placeholder));
                    cursor += 1;
                } else if window.contains(item.code) {
                    debug!("Ignoring repeated item v{} in window {}", item.code, window);
                } else {
                    debug!("Ignoring item v{} outside window {}", item.code, window);
                }
            }
        }

        debug!(
            "Window {} reconciled: {} found, {} gaps, {} fetches",
            window,
            records.len(),
            gaps.len(),
            fetches
        );

        Ok(WindowOutcome {
            window: *window,
            records,
            gaps,
            fetches,
        })
    }
}
