//! Backoff for transient store failures.
//!
//! Admission transactions on one event are serialized by the store. A writer
//! that loses a race (unique violation, serialization failure, deadlock) sees
//! a retryable [`StoreError::Conflict`](waitline_core::StoreError::Conflict),
//! and the whole transaction is re-run from `begin`.
//!
//! ```rust
//! use waitline_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(5)
//!     .with_initial_delay(Duration::from_millis(10))
//!     .with_max_delay(Duration::from_millis(500));
//!
//! let value = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("conflict"),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

/// How many times, and how far apart, a failed transaction is re-run.
///
/// The delay doubles after each attempt, starting at `initial_delay` and
/// never exceeding `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-runs after the first attempt
    pub max_retries: u32,
    /// Delay before the first re-run
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    /// 5 retries, 10ms doubling up to 1s.
    fn default() -> Self {
        Self::new(5)
    }
}

impl RetryPolicy {
    /// Policy with `max_retries` re-runs and the default delays.
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0)
    }

    /// Set the delay before the first re-run.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Cap every delay at `delay`.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before re-run number `attempt` (0-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `operation`, re-running it while `is_retryable` accepts its error.
///
/// Each re-run increments `waitline.transaction.retries`.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once
/// `policy.max_retries` re-runs have failed.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(retries = attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) => err,
        };

        if attempt >= policy.max_retries {
            tracing::error!(retries = attempt, error = %err, "Giving up after retries");
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        tracing::warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            error = %err,
            "Transient store failure, retrying"
        );
        metrics::counter!("waitline.transaction.retries").increment(1);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
