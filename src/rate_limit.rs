//! Rate limiting for provider requests
//!
//! Sliding window limiter that bounds how many requests a single provider may
//! issue per rolling window. Unlike a check-and-reject limiter, `acquire()`
//! waits until the request may legally proceed, so callers never see a
//! rate-limit error from this side.
//!
//! Each provider owns its own `RateLimiter`; budgets are never shared.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Snapshot of a limiter's budget, for logging and reports
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBudget {
    /// Wall-clock time of the oldest request still inside the window
    pub window_start: Option<DateTime<Utc>>,
    /// Requests recorded inside the current window
    pub count: usize,
    /// Maximum requests allowed in the window
    pub limit: usize,
    /// Length of the rolling window
    pub window_seconds: u64,
}

/// Sliding window rate limiter
/// Tracks request timestamps within a time window
pub struct RateLimiter {
    /// Request timestamps inside the window, oldest first
    requests: Mutex<VecDeque<Instant>>,
    /// Maximum requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `max_requests` - Maximum number of requests allowed in the window (clamped to 1)
    /// * `window` - Duration of the sliding window
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Limiter allowing `requests_per_minute` requests per rolling minute
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self::new(requests_per_minute as usize, Duration::from_secs(60))
    }

    /// Wait until a request may proceed, then record it
    ///
    /// The lock is held while sleeping so concurrent callers queue up behind
    /// the one currently waiting instead of racing for the same free slot.
    pub async fn acquire(&self) {
        let mut timestamps = self.requests.lock().await;

        let now = Instant::now();
        prune(&mut timestamps, now, self.window);

        if timestamps.len() >= self.max_requests {
            if let Some(oldest) = timestamps.front().copied() {
                let wait = (oldest + self.window).saturating_duration_since(now);
                if !wait.is_zero() {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        limit = self.max_requests,
                        "Rate limit reached, waiting for window"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
            prune(&mut timestamps, Instant::now(), self.window);
        }

        timestamps.push_back(Instant::now());
    }

    /// Get remaining requests in the current window
    pub async fn remaining(&self) -> usize {
        let mut timestamps = self.requests.lock().await;
        prune(&mut timestamps, Instant::now(), self.window);
        self.max_requests.saturating_sub(timestamps.len())
    }

    /// Snapshot the current budget
    pub async fn budget(&self) -> RateBudget {
        let mut timestamps = self.requests.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, self.window);

        let window_start = timestamps.front().map(|oldest| {
            let age = now.duration_since(*oldest);
            Utc::now() - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero())
        });

        RateBudget {
            window_start,
            count: timestamps.len(),
            limit: self.max_requests,
            window_seconds: self.window.as_secs(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // Default: 10 requests per 60 seconds
        Self::per_minute(10)
    }
}

/// Remove requests outside the window
fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = timestamps.front() {
        if now.duration_since(*oldest) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_under_limit_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.remaining().await, 0);
    }

    #[tokio::test]
    async fn test_acquire_over_limit_waits_for_window() {
        let window = Duration::from_millis(300);
        let limiter = RateLimiter::new(2, window);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await; // Third call must wait for the first to expire

        assert!(
            start.elapsed() >= window,
            "third acquire returned after {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_window_expiry_restores_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(200));
        limiter.acquire().await;
        assert_eq!(limiter.remaining().await, 0);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(limiter.remaining().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_respect_limit() {
        let window = Duration::from_millis(300);
        let limiter = Arc::new(RateLimiter::new(2, window));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        assert!(finished[2].duration_since(start) >= window);
    }

    #[tokio::test]
    async fn test_budget_snapshot() {
        let limiter = RateLimiter::per_minute(5);
        limiter.acquire().await;
        limiter.acquire().await;

        let budget = limiter.budget().await;
        assert_eq!(budget.count, 2);
        assert_eq!(budget.limit, 5);
        assert_eq!(budget.window_seconds, 60);
        assert!(budget.window_start.is_some());
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert_eq!(limiter.budget().await.limit, 1);
    }
}
