//! Router configuration.

use crate::handlers::{events, health, queue};
use crate::middleware::correlation_id;
use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

/// Build the API router.
///
/// - `/health`, `/ready`
/// - event management and the waiting list under `/api`
///
/// Every route runs behind the correlation id middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Events
        .route("/events", post(events::create_event).get(events::list_events))
        .route("/events/:event_id", get(events::get_event))
        .route("/events/:event_id/cancel", post(events::cancel_event))
        .route("/events/:event_id/availability", get(events::get_availability))
        // Waiting list
        .route("/events/:event_id/queue", post(queue::join_queue))
        .route("/events/:event_id/queue/:user_id", get(queue::get_position))
        .route(
            "/events/:event_id/entries/:entry_id/release",
            post(queue::release_offer),
        )
        .route(
            "/events/:event_id/entries/:entry_id/purchase",
            post(queue::confirm_purchase),
        )
        .route("/events/:event_id/tickets/:user_id", get(queue::get_ticket));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(correlation_id))
        .with_state(state)
}

/// Router for the Prometheus scrape endpoint.
///
/// Without a handle (the recorder was installed elsewhere) `/metrics`
/// answers 503.
pub fn metrics_router(handle: Option<PrometheusHandle>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(handle)
}

async fn render_metrics(
    State(handle): State<Option<PrometheusHandle>>,
) -> Result<String, StatusCode> {
    handle
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}
