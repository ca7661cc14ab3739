//! Retry budget for remote calls
//!
//! Exponential backoff with optional jitter, bounded by a total attempt
//! count. Only `RemoteError::is_retryable` failures are retried.

use std::time::Duration;

use crate::sync_engine::error::RemoteError;

pub const DEFAULT_FETCH_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_FETCH_RETRY_ATTEMPTS,
            Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            true,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow failed attempt number `attempt` (1-based).
    pub fn should_retry(&self, error: &RemoteError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt that follows failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let mut delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            // ±25% around the computed delay
            let millis = delay.as_millis() as u64;
            let range = millis / 4;
            let jittered = millis - range + fastrand::u64(0..=range * 2);
            delay = Duration::from_millis(jittered).min(self.max_delay);
        }
        delay
    }
}
