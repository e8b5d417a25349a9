//! Join rate limiting.
//!
//! Repeated rapid joins by the same identity are reported as
//! [`AdmissionError::Throttled`](crate::error::AdmissionError::Throttled),
//! which callers must be able to tell apart from a duplicate-join conflict.

use crate::error::AdmissionError;
use async_trait::async_trait;
use std::time::Duration;

/// Sliding-window rate limiter keyed by caller identity.
///
/// # Example
///
/// ```ignore
/// limiter.check_and_record("user-42", 3, Duration::from_secs(1800)).await?;
/// ```
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check the limit and record the attempt in one atomic step.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Throttled`] if `key` already made
    /// `max_attempts` attempts within `window`.
    async fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> Result<(), AdmissionError>;

    /// Forget all attempts recorded for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage fails.
    async fn reset(&self, key: &str) -> Result<(), AdmissionError>;
}
