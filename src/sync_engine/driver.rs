//! # Sync Driver
//!
//! State machine for one catch-up pass:
//! `ColdStart → Looping → Done | Fatal`.
//!
//! Each loop iteration re-derives `remaining` from the authoritative counts,
//! plans a window, reconciles it, persists the records, saves the advanced
//! checkpoint, reports progress and throttles. The checkpoint is saved only
//! after the window's records are stored, so an interrupted run repeats at
//! most one window.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::catalog_record::DEFAULT_DESCRIPTION_PLACEHOLDER;
use crate::domain::checkpoint::SyncCheckpoint;
use crate::domain::events::{SyncProgress, SyncState, SyncSummary};
use crate::domain::repositories::{CatalogSource, CheckpointStore, RecordStore};
use crate::domain::window::{Window, WindowPlanner, MAX_WINDOW_SIZE};
use crate::sync_engine::error::SyncError;
use crate::sync_engine::persistence::PersistenceStage;
use crate::sync_engine::reconciler::{Reconciler, WindowOutcome, DEFAULT_MAX_FOLLOWUP_FETCHES};
use crate::sync_engine::retry::{
    RetryPolicy, DEFAULT_FETCH_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};
use crate::sync_engine::throttle::{sleep_unless_cancelled, Throttle, DEFAULT_THROTTLE_MS};

/// Default number of record-less windows in a row before the scan is declared stalled.
pub const DEFAULT_MAX_CONSECUTIVE_EMPTY_WINDOWS: u32 = 50;

/// Per-window progress callback.
pub type SyncProgressCallback = dyn Fn(&SyncProgress) + Send + Sync;

/// Tunables for one driver.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub window_size: u32,
    pub throttle: Duration,
    pub fetch_retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_jitter: bool,
    pub max_followup_fetches: u32,
    /// 0 disables the stall guard
    pub max_consecutive_empty_windows: u32,
    pub description_placeholder: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            window_size: MAX_WINDOW_SIZE,
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            fetch_retry_attempts: DEFAULT_FETCH_RETRY_ATTEMPTS,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            retry_jitter: true,
            max_followup_fetches: DEFAULT_MAX_FOLLOWUP_FETCHES,
            max_consecutive_empty_windows: DEFAULT_MAX_CONSECUTIVE_EMPTY_WINDOWS,
            description_placeholder: DEFAULT_DESCRIPTION_PLACEHOLDER.to_string(),
        }
    }
}

impl SyncSettings {
    /// Settings without any waiting, for tests and dry runs against fakes.
    pub fn without_delays() -> Self {
        Self {
            throttle: Duration::ZERO,
            retry_base_delay: Duration::ZERO,
            retry_max_delay: Duration::ZERO,
            retry_jitter: false,
            ..Self::default()
        }
    }
}

pub struct SyncDriverBuilder {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn RecordStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    settings: SyncSettings,
    on_progress: Option<Arc<SyncProgressCallback>>,
    cancel: CancellationToken,
}

impl SyncDriverBuilder {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn RecordStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            source,
            store,
            checkpoints,
            settings: SyncSettings::default(),
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SyncProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn build(self) -> SyncDriver {
        let settings = self.settings;
        SyncDriver {
            source: self.source,
            checkpoints: self.checkpoints,
            persistence: PersistenceStage::new(self.store),
            planner: WindowPlanner::new(settings.window_size),
            reconciler: Reconciler::new(settings.max_followup_fetches, settings.description_placeholder),
            throttle: Throttle::new(settings.throttle),
            retry: RetryPolicy::new(
                settings.fetch_retry_attempts,
                settings.retry_base_delay,
                settings.retry_max_delay,
                settings.retry_jitter,
            ),
            max_consecutive_empty_windows: settings.max_consecutive_empty_windows,
            on_progress: self.on_progress,
            cancel: self.cancel,
        }
    }
}

pub struct SyncDriver {
    source: Arc<dyn CatalogSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    persistence: PersistenceStage,
    planner: WindowPlanner,
    reconciler: Reconciler,
    throttle: Throttle,
    retry: RetryPolicy,
    max_consecutive_empty_windows: u32,
    on_progress: Option<Arc<SyncProgressCallback>>,
    cancel: CancellationToken,
}

impl SyncDriver {
    pub fn builder(
        source: Arc<dyn CatalogSource>,
        store: Arc<dyn RecordStore>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> SyncDriverBuilder {
        SyncDriverBuilder::new(source, store, checkpoints)
    }

    /// Token that stops the run between windows or during a throttle pause.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// One complete pass from the saved checkpoint until the counts converge.
    pub async fn run_once(&self) -> Result<SyncSummary, SyncError> {
        let started = Instant::now();
        info!("🚀 Catalog sync pass starting");
        debug!("State → {}", SyncState::ColdStart);

        let mut checkpoint = match self.resume_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                error!("❌ Sync could not start: {}", e);
                return Err(e);
            }
        };

        let mut summary = SyncSummary::new(checkpoint);
        let result = self.drive(&mut checkpoint, &mut summary).await;
        summary.elapsed = started.elapsed();
        summary.final_checkpoint = checkpoint;

        match result {
            Ok(()) => {
                summary.final_state = SyncState::Done;
                info!(
                    "✅ Sync done: {} records added, {} record failures, {} gaps over {} windows in {:.1?} ({})",
                    summary.records_added,
                    summary.record_failures,
                    summary.gaps,
                    summary.windows_processed,
                    summary.elapsed,
                    summary.final_checkpoint
                );
                Ok(summary)
            }
            Err(e) => {
                summary.final_state = SyncState::Fatal;
                match &e {
                    SyncError::Cancelled { .. } => warn!("🛑 {}", e),
                    _ => error!("❌ Sync failed: {}", e),
                }
                info!(
                    "Partial summary: {} records added, {} record failures, {} gaps over {} windows in {:.1?} ({})",
                    summary.records_added,
                    summary.record_failures,
                    summary.gaps,
                    summary.windows_processed,
                    summary.elapsed,
                    summary.final_checkpoint
                );
                Err(e)
            }
        }
    }

    /// Load the checkpoint; an empty store restarts from code 1 whatever it says.
    async fn resume_checkpoint(&self) -> Result<SyncCheckpoint, SyncError> {
        let checkpoint = self.checkpoints.load().await?;
        let local_count = self.persistence.local_count().await?;

        if local_count == 0 && !checkpoint.is_cold() {
            warn!(
                "⚠️ Store is empty but checkpoint says {}; restarting from v1",
                checkpoint
            );
            return Ok(SyncCheckpoint::default());
        }

        info!(
            "📍 Resuming at v{} ({} records stored locally)",
            checkpoint.next_code(),
            local_count
        );
        Ok(checkpoint)
    }

    async fn drive(&self, checkpoint: &mut SyncCheckpoint, summary: &mut SyncSummary) -> Result<(), SyncError> {
        debug!("State → {}", SyncState::Looping);
        let mut empty_windows = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled { checkpoint: *checkpoint });
            }

            let remote_count = self.remote_count(summary, checkpoint).await?;
            let local_count = self.persistence.local_count().await?;
            let remaining = remote_count.saturating_sub(local_count);
            debug!(
                "Counts: remote={} local={} remaining={}",
                remote_count, local_count, remaining
            );

            let Some(window) = self.planner.plan(checkpoint, remaining) else {
                debug!("State → {}", SyncState::Done);
                return Ok(());
            };

            let outcome = self.reconcile_window(&window, summary, checkpoint).await?;
            let found = outcome.records.len();
            let gaps = outcome.gaps.len();
            let next = outcome.next_checkpoint(checkpoint);

            let report = self.persistence.insert_batch(outcome.records).await?;
            self.checkpoints.save(&next).await?;
            *checkpoint = next;

            summary.windows_processed += 1;
            summary.records_added += report.inserted as u64;
            summary.record_failures += report.failures.len() as u64;
            summary.gaps += gaps as u64;
            summary.final_checkpoint = next;

            info!(
                "📦 Window {}: {} found, {} stored, {} failed, {} gaps (checkpoint {})",
                window,
                found,
                report.inserted,
                report.failures.len(),
                gaps,
                next
            );

            if let Some(callback) = &self.on_progress {
                callback(&SyncProgress {
                    window,
                    inserted: report.inserted,
                    failed: report.failures.len(),
                    gaps,
                    remaining_before: remaining,
                    remote_count,
                    checkpoint: next,
                });
            }

            if found == 0 {
                empty_windows += 1;
                if self.max_consecutive_empty_windows > 0 && empty_windows >= self.max_consecutive_empty_windows {
                    return Err(SyncError::Stalled {
                        empty_windows,
                        checkpoint: next,
                        remaining,
                    });
                }
            } else {
                empty_windows = 0;
            }

            if !self.throttle.delay(&window, &self.cancel).await {
                return Err(SyncError::Cancelled { checkpoint: *checkpoint });
            }
        }
    }

    async fn remote_count(&self, summary: &mut SyncSummary, checkpoint: &SyncCheckpoint) -> Result<u64, SyncError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.count().await {
                Ok(count) => return Ok(count),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "🔄 Remote count attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.retry.max_attempts(),
                        e,
                        delay
                    );
                    summary.fetch_retries += 1;
                    if !sleep_unless_cancelled(delay, &self.cancel).await {
                        return Err(SyncError::Cancelled { checkpoint: *checkpoint });
                    }
                }
                Err(e) => return Err(SyncError::Remote(e)),
            }
        }
    }

    async fn reconcile_window(
        &self,
        window: &Window,
        summary: &mut SyncSummary,
        checkpoint: &SyncCheckpoint,
    ) -> Result<WindowOutcome, SyncError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.reconciler.reconcile(self.source.as_ref(), window).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if self.retry.should_retry(&e, attempt) => {
                    let delay = self.retry.delay_for(attempt).max(self.throttle.interval());
                    warn!(
                        "🔄 Window {} attempt {}/{} failed: {}; retrying in {:?}",
                        window,
                        attempt,
                        self.retry.max_attempts(),
                        e,
                        delay
                    );
                    summary.fetch_retries += 1;
                    if !sleep_unless_cancelled(delay, &self.cancel).await {
                        return Err(SyncError::Cancelled { checkpoint: *checkpoint });
                    }
                }
                Err(e) if e.is_retryable() => {
                    return Err(SyncError::FetchRetriesExhausted {
                        window: *window,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => return Err(SyncError::Remote(e)),
            }
        }
    }
}
