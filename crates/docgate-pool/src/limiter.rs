//! Fixed-window request limiter with a minimum gap
//!
//! Enforces "at most N requests per window" together with "never two
//! requests closer than `min_interval`". Only providers with published
//! per-minute limits get one; credits-style providers rely on rotation.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitParams {
    pub max_per_window: u32,
    pub window: Duration,
    pub min_interval: Duration,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            max_per_window: 20,
            window: Duration::from_secs(60),
            min_interval: Duration::from_secs(3),
        }
    }
}

/// Snapshot for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStatus {
    pub used_in_window: u32,
    pub limit: u32,
    pub reset_in_secs: u64,
}

#[derive(Debug, Default)]
struct State {
    window_start: Option<Instant>,
    count_in_window: u32,
    last_request_at: Option<Instant>,
}

pub struct RateLimiter {
    id: String,
    params: RateLimitParams,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(id: impl Into<String>, mut params: RateLimitParams) -> Self {
        params.max_per_window = params.max_per_window.max(1);
        Self {
            id: id.into(),
            params,
            state: Mutex::new(State::default()),
        }
    }

    /// Time until a request is allowed under both constraints. Zero means now.
    fn wait_needed(&self, state: &State, now: Instant) -> Duration {
        let window_wait = match state.window_start {
            Some(start)
                if now.saturating_duration_since(start) < self.params.window
                    && state.count_in_window >= self.params.max_per_window =>
            {
                (start + self.params.window).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        };
        let gap_wait = match state.last_request_at {
            Some(last) => (last + self.params.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        };
        window_wait.max(gap_wait)
    }

    fn record(&self, state: &mut State, now: Instant) {
        let expired = state
            .window_start
            .is_none_or(|start| now.saturating_duration_since(start) >= self.params.window);
        if expired {
            state.window_start = Some(now);
            state.count_in_window = 0;
        }
        state.count_in_window += 1;
        state.last_request_at = Some(now);
    }

    /// Take a slot if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        if !self.wait_needed(&state, now).is_zero() {
            return false;
        }
        self.record(&mut state, now);
        true
    }

    /// Wait until a slot is free, then take it.
    ///
    /// The lock is released while sleeping; another caller may win the slot,
    /// in which case the wait is recomputed.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let wait = self.wait_needed(&state, now);
                if wait.is_zero() {
                    self.record(&mut state, now);
                    return;
                }
                wait
            };
            debug!(limiter = %self.id, wait_ms = wait.as_millis() as u64, "rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    pub async fn status(&self) -> LimiterStatus {
        let state = self.state.lock().await;
        let now = Instant::now();
        let (used_in_window, reset_in_secs) = match state.window_start {
            Some(start) if now.saturating_duration_since(start) < self.params.window => {
                let remaining = (start + self.params.window).saturating_duration_since(now);
                // Round up so a partially elapsed second still reads as 1
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                (state.count_in_window, secs)
            }
            _ => (0, 0),
        };
        LimiterStatus {
            used_in_window,
            limit: self.params.max_per_window,
            reset_in_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32, min_interval_secs: u64) -> RateLimiter {
        RateLimiter::new(
            "test",
            RateLimitParams {
                max_per_window: max,
                window: Duration::from_secs(60),
                min_interval: Duration::from_secs(min_interval_secs),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn twenty_five_requests_respect_window_and_gap() {
        let limiter = limiter(20, 3);
        let start = Instant::now();
        let mut times = Vec::new();
        for _ in 0..25 {
            limiter.acquire().await;
            times.push(Instant::now());
        }

        let in_first_window = times
            .iter()
            .filter(|t| t.duration_since(start) < Duration::from_secs(60))
            .count();
        assert_eq!(in_first_window, 20);

        for pair in times.windows(2) {
            assert!(
                pair[1].duration_since(pair[0]) >= Duration::from_secs(3),
                "requests closer than min interval"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_blocks_until_reset() {
        let limiter = limiter(20, 0);
        let start = Instant::now();
        for _ in 0..20 {
            assert!(limiter.try_acquire().await);
        }
        assert!(!limiter.try_acquire().await);

        limiter.acquire().await;
        assert_eq!(Instant::now().duration_since(start), Duration::from_secs(60));
        assert_eq!(limiter.status().await.used_in_window, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_honours_min_interval() {
        let limiter = limiter(20, 3);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_usage_and_reset() {
        let limiter = limiter(20, 0);
        assert_eq!(
            limiter.status().await,
            LimiterStatus {
                used_in_window: 0,
                limit: 20,
                reset_in_secs: 0
            }
        );

        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(10_500)).await;

        let status = limiter.status().await;
        assert_eq!(status.used_in_window, 2);
        assert_eq!(status.reset_in_secs, 50);

        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(limiter.status().await.used_in_window, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_the_window() {
        let limiter = std::sync::Arc::new(limiter(5, 0));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut late = 0;
        for handle in handles {
            if handle.await.unwrap().duration_since(start) >= Duration::from_secs(60) {
                late += 1;
            }
        }
        assert_eq!(late, 5);
    }
}
