//! Admission policy configuration.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// Default offer window: 30 minutes.
pub const DEFAULT_OFFER_WINDOW_SECS: u64 = 30 * 60;

/// Default number of joins a user may make per window.
pub const DEFAULT_JOIN_LIMIT: u32 = 3;

/// Default join rate-limit window: 30 minutes.
pub const DEFAULT_JOIN_WINDOW_SECS: u64 = 30 * 60;

/// Longest accepted offer or rate-limit window: 7 days.
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Accepted values for `offer_window_secs`.
pub const OFFER_WINDOW_SECS_RANGE: RangeInclusive<u64> = 1..=MAX_WINDOW_SECS;

/// Accepted values for `join_window_secs`.
pub const JOIN_WINDOW_SECS_RANGE: RangeInclusive<u64> = 1..=MAX_WINDOW_SECS;

/// Tunable admission policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Seconds an offer stays redeemable
    pub offer_window_secs: u64,
    /// Joins allowed per user within `join_window_secs` (0 disables the limit)
    pub join_limit: u32,
    /// Rate-limit window in seconds
    pub join_window_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            offer_window_secs: DEFAULT_OFFER_WINDOW_SECS,
            join_limit: DEFAULT_JOIN_LIMIT,
            join_window_secs: DEFAULT_JOIN_WINDOW_SECS,
        }
    }
}

impl AdmissionConfig {
    /// Offer window as a chrono duration, for timestamp arithmetic.
    ///
    /// Values outside [`OFFER_WINDOW_SECS_RANGE`] are clamped into it, so an
    /// offer always expires after it was made and never past chrono's range.
    #[must_use]
    pub fn offer_window(&self) -> chrono::Duration {
        let secs = self
            .offer_window_secs
            .clamp(*OFFER_WINDOW_SECS_RANGE.start(), *OFFER_WINDOW_SECS_RANGE.end());
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::minutes(30))
    }

    /// Rate-limit window, capped at [`MAX_WINDOW_SECS`].
    #[must_use]
    pub fn join_window(&self) -> Duration {
        Duration::from_secs(self.join_window_secs.min(MAX_WINDOW_SECS))
    }

    /// Whether joins are rate limited at all.
    #[must_use]
    pub const fn join_limit_enabled(&self) -> bool {
        self.join_limit > 0
    }
}
