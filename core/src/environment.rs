//! Environment module - injected dependencies.
//!
//! Everything the reducer needs from the outside world arrives through
//! [`QueueEnvironment`], so the state machine stays deterministic under test.

use crate::config::AdmissionConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
///
/// # Examples
///
/// ```ignore
/// // Production - uses system clock
/// let clock = SystemClock;
///
/// // Test - fixed time for deterministic tests
/// let clock = FixedClock::new(time);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Environment dependencies for the queue reducer
#[derive(Clone)]
pub struct QueueEnvironment {
    /// Clock for offer windows and timestamps
    pub clock: Arc<dyn Clock>,
    /// How long an offer stays redeemable
    pub offer_window: chrono::Duration,
}

impl QueueEnvironment {
    /// Creates a new `QueueEnvironment`
    #[must_use]
    pub const fn new(clock: Arc<dyn Clock>, offer_window: chrono::Duration) -> Self {
        Self {
            clock,
            offer_window,
        }
    }

    /// Creates an environment from admission configuration
    #[must_use]
    pub fn from_config(clock: Arc<dyn Clock>, config: &AdmissionConfig) -> Self {
        Self::new(clock, config.offer_window())
    }
}

impl std::fmt::Debug for QueueEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEnvironment")
            .field("offer_window", &self.offer_window)
            .finish_non_exhaustive()
    }
}
