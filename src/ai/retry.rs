//! Retry with exponential backoff
//!
//! Only transient failures (transport, timeout, 429, 5xx) are retried. Every
//! attempt, including retries, first takes a slot from the provider's rate
//! limiter so retries can never exceed the configured budget.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::providers::ProviderFailure;
use crate::config::RetrySettings;
use crate::rate_limit::RateLimiter;

const BACKOFF_MULTIPLIER: u32 = 2;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// A single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based): base * 2^(attempt-1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = BACKOFF_MULTIPLIER.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn execute<T, F, Fut>(
        &self,
        provider_id: &str,
        limiter: &RateLimiter,
        mut operation: F,
    ) -> Result<T, ProviderFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        let mut attempt = 1;
        loop {
            limiter.acquire().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(failure) if failure.kind.is_transient() && attempt < self.max_attempts => {
                    let delay = failure
                        .retry_after
                        .map(|d| d.min(self.max_delay))
                        .unwrap_or_else(|| self.delay_for(attempt));
                    let budget = limiter.budget().await;
                    warn!(
                        provider = %provider_id,
                        attempt,
                        max_attempts = self.max_attempts,
                        window_used = budget.count,
                        window_limit = budget.limit,
                        kind = %failure.kind,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(30))
    }
}
