//! # Waitline Runtime
//!
//! Imperative shell for the Waitline admission controller.
//!
//! The core crate decides; this crate executes. It wraps
//! [`QueueReducer`](waitline_core::queue::QueueReducer) in per-event
//! transactions and drives the background work around it.
//!
//! ## Core Components
//!
//! - **[`AdmissionService`]**: runs every mutating operation as one serialized
//!   transaction with retries on transient store failures
//! - **[`ExpiryWorker`]**: delivers durable offer timers at least once
//! - **[`SlidingWindowRateLimiter`]**: per-user join throttling
//! - **[`MetricsServer`]** / **[`ReadinessProbe`]**: Prometheus metrics and
//!   readiness reporting
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use waitline_core::{AdmissionConfig, SystemClock, UserId};
//! use waitline_runtime::{AdmissionService, SlidingWindowRateLimiter};
//!
//! let clock = Arc::new(SystemClock);
//! let limiter = Arc::new(SlidingWindowRateLimiter::new(clock.clone()));
//! let service = AdmissionService::new(store, limiter, clock, AdmissionConfig::default());
//!
//! let event = service.create_event("Spring Concert", 100).await?;
//! let outcome = service.join(event.id, UserId::new("alice")).await?;
//! ```

/// Readiness checks over the store and timer backlog
pub mod health;

/// Prometheus metrics for observability
pub mod metrics;

/// In-process join rate limiting
pub mod rate_limit;

/// Retry logic with exponential backoff
pub mod retry;

/// Transactional admission operations
pub mod service;

/// Background delivery of expiry timers
pub mod worker;

pub use health::{HealthCheck, HealthReport, HealthStatus, ReadinessProbe};
pub use metrics::{AdmissionMetrics, MetricsError, MetricsServer};
pub use rate_limit::SlidingWindowRateLimiter;
pub use retry::{RetryPolicy, retry_with_predicate};
pub use service::AdmissionService;
pub use worker::{ExpiryWorker, WorkerConfig};
