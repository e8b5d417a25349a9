//! Event management endpoints.
//!
//! - POST /api/events - Create an event
//! - GET /api/events - List events that are not cancelled
//! - GET /api/events/:event_id - Get one event
//! - POST /api/events/:event_id/cancel - Cancel an event
//! - GET /api/events/:event_id/availability - Capacity ledger for an event

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use waitline_core::types::{Event, EventId, NewEvent, UserId};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create an event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Display name
    pub name: String,
    /// Inventory units, at least 1
    pub total_capacity: u32,
    /// Organizer, who will not be able to join
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Start time, must be in the future
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}

impl From<CreateEventRequest> for NewEvent {
    fn from(request: CreateEventRequest) -> Self {
        Self {
            name: request.name,
            total_capacity: request.total_capacity,
            owner_id: request.owner_id.map(UserId::new),
            starts_at: request.starts_at,
        }
    }
}

/// Event details.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventResponse {
    /// Event ID
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Inventory units
    pub total_capacity: u32,
    /// Whether the event was cancelled
    pub is_cancelled: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Organizer
    pub owner_id: Option<String>,
    /// Start time
    pub starts_at: Option<DateTime<Utc>>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: *event.id.as_uuid(),
            name: event.name,
            total_capacity: event.total_capacity.value(),
            is_cancelled: event.is_cancelled,
            created_at: event.created_at,
            owner_id: event.owner_id.map(|owner| owner.as_str().to_string()),
            starts_at: event.starts_at,
        }
    }
}

/// Response for listing events.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListEventsResponse {
    /// Events, oldest first
    pub events: Vec<EventResponse>,
}

/// Capacity ledger for one event.
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    /// Event ID
    pub event_id: Uuid,
    /// Inventory units
    pub total_capacity: u32,
    /// Tickets sold
    pub committed: u32,
    /// Offers that have not lapsed
    pub live_offers: u32,
    /// Units that can be offered right now
    pub remaining: u32,
    /// Whether nothing can be offered
    pub sold_out: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an event.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "Content-Type: application/json" \
///   -d '{"name": "Spring Concert", "total_capacity": 100,
///        "owner_id": "organizer-1", "starts_at": "2030-06-01T19:00:00Z"}'
/// ```
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let event = state.service.create_event_with(request.into()).await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

/// List events that are not cancelled.
pub async fn list_events(State(state): State<AppState>) -> Result<Json<ListEventsResponse>, AppError> {
    let events = state.service.list_events().await?;
    Ok(Json(ListEventsResponse {
        events: events.into_iter().map(EventResponse::from).collect(),
    }))
}

/// Get one event.
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventResponse>, AppError> {
    let event = state.service.get_event(EventId::from_uuid(event_id)).await?;
    Ok(Json(event.into()))
}

/// Cancel an event. Joins are rejected afterwards; pending offers may still be
/// purchased until they lapse.
pub async fn cancel_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventResponse>, AppError> {
    let event = state
        .service
        .cancel_event(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(event.into()))
}

/// Current availability, recomputed from records on every call.
///
/// ```json
/// {
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "total_capacity": 100,
///   "committed": 40,
///   "live_offers": 5,
///   "remaining": 55,
///   "sold_out": false
/// }
/// ```
pub async fn get_availability(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let availability = state
        .service
        .availability(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(AvailabilityResponse {
        event_id,
        total_capacity: availability.total_capacity,
        committed: availability.committed,
        live_offers: availability.live_offers,
        remaining: availability.remaining,
        sold_out: availability.sold_out,
    }))
}
