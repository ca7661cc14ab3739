//! Fixed pacing between windows.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::window::Window;

/// Default pause between windows in milliseconds.
pub const DEFAULT_THROTTLE_MS: u64 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_THROTTLE_MS))
    }
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Pause after `window`. Returns `false` if cancelled while waiting.
    pub async fn delay(&self, window: &Window, cancel: &CancellationToken) -> bool {
        if self.interval.is_zero() {
            return !cancel.is_cancelled();
        }
        debug!("⏳ Throttling {:?} after window {}", self.interval, window);
        sleep_unless_cancelled(self.interval, cancel).await
    }
}

/// Sleep for `duration`; `false` when the token fires first.
pub async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_zero_interval_returns_immediately() {
        let throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.delay(&Window::new(1, 10), &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn test_delay_waits_for_interval() {
        let throttle = Throttle::new(Duration::from_millis(30));
        let started = Instant::now();
        assert!(throttle.delay(&Window::new(1, 10), &CancellationToken::new()).await);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_delay() {
        let throttle = Throttle::new(Duration::from_secs(60));
        let token = CancellationToken::new();
        token.cancel();

        let started = Instant::now();
        assert!(!throttle.delay(&Window::new(1, 10), &token).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
