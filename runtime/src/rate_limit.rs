//! In-process sliding-window join limiter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use waitline_core::environment::Clock;
use waitline_core::error::AdmissionError;
use waitline_core::rate_limit::RateLimiter;

/// Sliding-window rate limiter kept in process memory.
///
/// Each key keeps the timestamps of its attempts inside the current window;
/// older timestamps are pruned whenever the key is checked. Limits are per
/// process, so several replicas each enforce their own window.
#[derive(Clone)]
pub struct SlidingWindowRateLimiter {
    attempts: Arc<Mutex<HashMap<String, Vec<DateTime<Utc>>>>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter that reads time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.attempts.lock().await.len()
    }

    /// Drop keys whose attempts all fell out of `window`.
    pub async fn prune(&self, window: Duration) {
        let window_start = self.clock.now() - to_chrono(window);
        self.attempts.lock().await.retain(|_, timestamps| {
            timestamps.retain(|&ts| ts > window_start);
            !timestamps.is_empty()
        });
    }
}

impl std::fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter").finish_non_exhaustive()
    }
}

fn to_chrono(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(365))
}

#[async_trait]
impl RateLimiter for SlidingWindowRateLimiter {
    async fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> Result<(), AdmissionError> {
        let now = self.clock.now();
        let window = to_chrono(window);
        let window_start = now - window;

        let mut attempts = self.attempts.lock().await;
        let timestamps = attempts.entry(key.to_string()).or_default();
        timestamps.retain(|&ts| ts > window_start);

        if timestamps.len() >= max_attempts as usize {
            let oldest = timestamps.iter().min().copied().unwrap_or(now);
            let retry_after = (oldest + window - now).to_std().unwrap_or(Duration::ZERO);

            tracing::warn!(
                key = %key,
                attempts = timestamps.len(),
                max_attempts,
                retry_after_secs = retry_after.as_secs(),
                "Join rate limit exceeded"
            );
            return Err(AdmissionError::Throttled { retry_after });
        }

        timestamps.push(now);
        tracing::trace!(key = %key, attempts = timestamps.len(), "Recorded join attempt");
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), AdmissionError> {
        self.attempts.lock().await.remove(key);
        Ok(())
    }
}
