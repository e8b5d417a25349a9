//! Health checks for readiness probes.

use serde::Serialize;
use std::sync::Arc;
use waitline_core::store::{QueueStore, TimerQueue};

/// Health check status levels
///
/// Indicates the current health state of a component or system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,

    /// Component is operational but lagging (e.g., a timer backlog)
    Degraded,

    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if status is unhealthy
    #[must_use]
    pub const fn is_unhealthy(self) -> bool {
        matches!(self, Self::Unhealthy)
    }

    /// Get the worst status between two statuses
    #[must_use]
    pub const fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unhealthy, _) | (_, Self::Unhealthy) => Self::Unhealthy,
            (Self::Degraded, _) | (_, Self::Degraded) => Self::Degraded,
            _ => Self::Healthy,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check result for a component
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Name of the component being checked
    pub component: String,

    /// Current health status
    pub status: HealthStatus,

    /// Optional message providing details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Create a healthy check result
    #[must_use]
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    /// Create a degraded check result
    #[must_use]
    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    /// Create an unhealthy check result
    #[must_use]
    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health report
///
/// Combines multiple health checks into an overall system status.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall system status (worst of all checks)
    pub status: HealthStatus,

    /// Individual component checks
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// Create a new health report from checks
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::worst);

        Self { status, checks }
    }

    /// Whether the system can serve traffic (degraded still can).
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !self.status.is_unhealthy()
    }
}

/// Checks the store and the timer backlog.
#[derive(Clone)]
pub struct ReadinessProbe {
    store: Arc<dyn QueueStore>,
    timers: Arc<dyn TimerQueue>,
    backlog_threshold: usize,
}

impl ReadinessProbe {
    /// Create a probe that reports degraded once more than
    /// `backlog_threshold` timers are outstanding.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        timers: Arc<dyn TimerQueue>,
        backlog_threshold: usize,
    ) -> Self {
        Self {
            store,
            timers,
            backlog_threshold,
        }
    }

    /// Run all checks.
    pub async fn check(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => HealthCheck::healthy("store"),
            Err(e) => HealthCheck::unhealthy("store", e.to_string()),
        };

        let timers = match self.timers.pending().await {
            Ok(pending) if pending > self.backlog_threshold => HealthCheck::degraded(
                "expiry_timers",
                format!("{pending} timers outstanding"),
            ),
            Ok(_) => HealthCheck::healthy("expiry_timers"),
            Err(e) => HealthCheck::unhealthy("expiry_timers", e.to_string()),
        };

        HealthReport::new(vec![store, timers])
    }
}

impl std::fmt::Debug for ReadinessProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessProbe")
            .field("backlog_threshold", &self.backlog_threshold)
            .finish_non_exhaustive()
    }
}
