//! Prometheus metrics for the admission controller.
//!
//! Counters cover every state transition the service commits:
//! - Joins, labelled by outcome
//! - Offers promoted, expired and released
//! - Purchases confirmed
//! - Expiry timers fired and transaction retries
//!
//! Transitions are recorded only after their transaction commits, so a
//! retried transaction is counted once.
//!
//! # Example
//!
//! ```rust,no_run
//! use waitline_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Serve `server.render()` on GET /metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder plus the address its scrape endpoint is served on.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Socket address the scrape endpoint binds to (e.g., `0.0.0.0:9090`)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Address the scrape endpoint should bind to.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder installed earlier in the same process (e.g., by another
    /// test) is tolerated.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "waitline.join.total",
        "Join attempts by outcome (offered, waiting, conflict, throttled, rejected)"
    );
    describe_counter!(
        "waitline.offers.promoted",
        "Waiting entries promoted to offers"
    );
    describe_counter!("waitline.offers.expired", "Offers expired by their timer");
    describe_counter!("waitline.offers.released", "Offers released by their holder");
    describe_counter!(
        "waitline.purchases.confirmed",
        "Offers redeemed for a ticket"
    );
    describe_counter!("waitline.timers.fired", "Expiry timers delivered and completed");
    describe_counter!(
        "waitline.transaction.retries",
        "Transactions re-run after a transient store failure"
    );
    describe_counter!(
        "waitline.store.conflicts",
        "Transactions the database aborted in favour of a concurrent writer"
    );
    describe_histogram!(
        "waitline.transaction.duration_seconds",
        "Time taken by one admission transaction, retries included"
    );
}

/// Admission metrics recorder.
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    /// Record a join attempt with its outcome label.
    pub fn record_join(outcome: &'static str) {
        counter!("waitline.join.total", "status" => outcome).increment(1);
    }

    /// Record offers created by promotion.
    pub fn record_promoted(count: u64) {
        if count > 0 {
            counter!("waitline.offers.promoted").increment(count);
        }
    }

    /// Record an offer expired by its timer.
    pub fn record_expired() {
        counter!("waitline.offers.expired").increment(1);
    }

    /// Record an offer released by its holder.
    pub fn record_released() {
        counter!("waitline.offers.released").increment(1);
    }

    /// Record a confirmed purchase.
    pub fn record_purchase() {
        counter!("waitline.purchases.confirmed").increment(1);
    }

    /// Record a completed expiry timer.
    pub fn record_timer_fired() {
        counter!("waitline.timers.fired").increment(1);
    }

    /// Record how long a transaction took.
    pub fn record_transaction(operation: &'static str, duration: Duration) {
        histogram!("waitline.transaction.duration_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }
}
