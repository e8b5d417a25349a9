//! HTTP boundary for the Waitline admission controller.
//!
//! Exposes event management and the waiting list over JSON, plus health and
//! readiness probes:
//!
//! ```text
//! GET  /health
//! GET  /ready
//! POST /api/events
//! GET  /api/events
//! GET  /api/events/:event_id
//! POST /api/events/:event_id/cancel
//! GET  /api/events/:event_id/availability
//! POST /api/events/:event_id/queue
//! GET  /api/events/:event_id/queue/:user_id
//! POST /api/events/:event_id/entries/:entry_id/release
//! POST /api/events/:event_id/entries/:entry_id/purchase
//! GET  /api/events/:event_id/tickets/:user_id
//! ```
//!
//! The `waitline` binary wires these routes to a `PostgreSQL` store and runs
//! the expiry worker alongside.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId};
pub use routes::{build_router, metrics_router};
pub use state::AppState;
