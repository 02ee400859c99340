//! Call budget shared by every request to one upstream provider.
//!
//! A window opens on the first call after the previous one expired. Once
//! `limit` calls have been admitted inside a window, callers sleep until the
//! window closes instead of failing.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Length of the budget window used by both providers.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct WindowState {
    started: Option<Instant>,
    used: u32,
}

/// Fixed-budget throttle: at most `limit` calls per `period`.
///
/// Shared through an `Arc` by every caller of one upstream. The lock is held
/// while a caller waits for the window to roll, so waiters are admitted in
/// arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    limit: u32,
    period: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, limit: u32, period: Duration) -> Self {
        Self {
            name: name.into(),
            limit: limit.max(1),
            period,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Throttle with a one-minute window.
    pub fn per_minute(name: impl Into<String>, limit: u32) -> Self {
        Self::new(name, limit, DEFAULT_PERIOD)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Wait until the budget admits one more call, then consume it.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            match state.started {
                Some(started) if now < started + self.period => {
                    if state.used < self.limit {
                        state.used += 1;
                        return;
                    }
                    let reopens = started + self.period;
                    debug!(
                        limiter = %self.name,
                        wait_ms = reopens.saturating_duration_since(now).as_millis() as u64,
                        "call budget exhausted, waiting for window"
                    );
                    sleep_until(reopens).await;
                }
                _ => {
                    state.started = Some(now);
                    state.used = 1;
                    return;
                }
            }
        }
    }

    /// Calls admitted in the current window (0 if the window has expired).
    pub async fn used(&self) -> u32 {
        let state = self.state.lock().await;
        match state.started {
            Some(started) if Instant::now() < started + self.period => state.used,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_calls_within_budget_do_not_wait() {
        let limiter = RateLimiter::per_minute("test", 3);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.used().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_budget_waits_for_window() {
        let limiter = RateLimiter::per_minute("test", 2);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(61));
        assert_eq!(limiter.used().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_idle_period() {
        let limiter = RateLimiter::per_minute("test", 1);
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(limiter.used().await, 0);

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_budget() {
        let limiter = Arc::new(RateLimiter::per_minute("shared", 4));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                start.elapsed()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }

        let in_window = |lo: u64, hi: u64| {
            admitted
                .iter()
                .filter(|d| **d >= Duration::from_secs(lo) && **d < Duration::from_secs(hi))
                .count()
        };
        assert_eq!(in_window(0, 60), 4);
        assert_eq!(in_window(60, 120), 4);
        assert_eq!(in_window(120, 180), 2);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let limiter = RateLimiter::per_minute("test", 0);
        assert_eq!(limiter.limit(), 1);
        assert_eq!(limiter.name(), "test");
    }
}
