//! Expiry worker - delivers durable offer timers.
//!
//! Polls [`TimerQueue::claim_due`] and runs [`AdmissionService::expire`] for
//! each claimed timer. A timer is completed only after its expiry committed
//! (the no-op path included); if expiry fails the lease runs out and another
//! poll picks the timer up again. Delivery is therefore at-least-once, which
//! is safe because expiry is idempotent.

use crate::metrics::AdmissionMetrics;
use crate::service::AdmissionService;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use waitline_core::error::StoreError;
use waitline_core::store::TimerQueue;

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of timers claimed per poll.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default lease on a claimed timer, in seconds.
pub const DEFAULT_LEASE_SECS: u64 = 60;

/// Accepted values for `poll_interval_ms`: up to one minute.
pub const POLL_INTERVAL_MS_RANGE: RangeInclusive<u64> = 1..=60_000;

/// Accepted values for `batch_size`.
pub const BATCH_SIZE_RANGE: RangeInclusive<usize> = 1..=10_000;

/// Accepted values for `lease_secs`: up to one hour.
pub const LEASE_SECS_RANGE: RangeInclusive<u64> = 1..=60 * 60;

/// Worker tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pause between polls when no timer is due
    pub poll_interval_ms: u64,
    /// Timers claimed per poll
    pub batch_size: usize,
    /// How long a claimed timer stays invisible to other workers
    pub lease_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            lease_secs: DEFAULT_LEASE_SECS,
        }
    }
}

impl WorkerConfig {
    /// Poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lease as a chrono duration, clamped into [`LEASE_SECS_RANGE`].
    #[must_use]
    pub fn lease(&self) -> chrono::Duration {
        let secs = self
            .lease_secs
            .clamp(*LEASE_SECS_RANGE.start(), *LEASE_SECS_RANGE.end());
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(60))
    }

    /// Timers claimed per poll, never zero.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
            .clamp(*BATCH_SIZE_RANGE.start(), *BATCH_SIZE_RANGE.end())
    }
}

/// Background task that fires expiry timers.
pub struct ExpiryWorker {
    service: AdmissionService,
    timers: Arc<dyn TimerQueue>,
    config: WorkerConfig,
}

impl ExpiryWorker {
    /// Create a worker delivering timers from `timers` to `service`.
    #[must_use]
    pub fn new(service: AdmissionService, timers: Arc<dyn TimerQueue>, config: WorkerConfig) -> Self {
        Self {
            service,
            timers,
            config,
        }
    }

    /// Claim one batch of due timers and fire them.
    ///
    /// Returns how many timers were claimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if claiming fails. Failures of individual
    /// expiries are logged and leave their timer to be redelivered.
    pub async fn tick(&self) -> Result<usize, StoreError> {
        let now = self.service.clock().now();
        let claimed = self
            .timers
            .claim_due(now, self.config.batch_size(), self.config.lease())
            .await?;

        for timer in &claimed {
            match self.service.expire(timer.entry_id, timer.event_id).await {
                Ok(()) => {
                    self.timers.complete(timer.id).await?;
                    AdmissionMetrics::record_timer_fired();
                }
                Err(e) => {
                    tracing::warn!(
                        timer_id = %timer.id,
                        entry_id = %timer.entry_id,
                        attempts = timer.attempts,
                        error = %e,
                        "Expiry failed, timer will be redelivered"
                    );
                }
            }
        }

        Ok(claimed.len())
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "Expiry worker started"
        );

        while !*shutdown.borrow() {
            let full_batch = match self.tick().await {
                Ok(claimed) => claimed >= self.config.batch_size(),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim expiry timers");
                    false
                }
            };

            // A full batch means more may be due; poll again right away
            if full_batch {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        tracing::info!("Expiry worker stopped");
    }
}

impl std::fmt::Debug for ExpiryWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryWorker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
