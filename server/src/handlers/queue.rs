//! Waiting-list endpoints.
//!
//! - POST /api/events/:event_id/queue - Join the waiting list
//! - GET /api/events/:event_id/queue/:user_id - Current entry and rank
//! - POST /api/events/:event_id/entries/:entry_id/release - Give up an offer
//! - POST /api/events/:event_id/entries/:entry_id/purchase - Redeem an offer
//! - GET /api/events/:event_id/tickets/:user_id - A user's ticket

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
use waitline_core::types::{EntryId, EntryStatus, EventId, Ticket, UserId};

/// Request to join an event's waiting list.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    /// Caller identity
    pub user_id: String,
}

/// Result of a join.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinResponse {
    /// Always true; waiting is a successful join
    pub success: bool,
    /// `offered` or `waiting`
    pub status: EntryStatus,
    /// Human-readable result
    pub message: String,
    /// Created entry
    pub entry_id: Uuid,
    /// Offer deadline when offered
    pub offer_expires_at: Option<DateTime<Utc>>,
}

/// A user's entry and rank.
#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    /// Entry ID
    pub entry_id: Uuid,
    /// `waiting`, `offered` or `purchased`
    pub status: EntryStatus,
    /// 1-based rank among contending entries
    pub position: u32,
    /// Offer deadline when offered
    pub offer_expires_at: Option<DateTime<Utc>>,
}

/// Join an event's waiting list.
///
/// Returns 201 with the offer when capacity is free, otherwise with a waiting
/// entry.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/queue \
///   -H "Content-Type: application/json" \
///   -d '{"user_id": "user-42"}'
/// ```
pub async fn join_queue(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(request): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let outcome = state
        .service
        .join(EventId::from_uuid(event_id), UserId::new(request.user_id))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(JoinResponse {
            success: outcome.success,
            status: outcome.status,
            message: outcome.message,
            entry_id: *outcome.entry.id.as_uuid(),
            offer_expires_at: outcome.entry.offer_expires_at,
        }),
    ))
}

/// Get a user's entry and rank.
///
/// Returns 404 when the user holds no active entry for the event.
pub async fn get_position(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<PositionResponse>, AppError> {
    let user = UserId::new(user_id);
    let position = state
        .service
        .position(EventId::from_uuid(event_id), &user)
        .await?
        .ok_or_else(|| AppError::not_found("Queue entry for user", &user))?;

    Ok(Json(PositionResponse {
        entry_id: *position.entry.id.as_uuid(),
        status: position.entry.status,
        position: position.position,
        offer_expires_at: position.entry.offer_expires_at,
    }))
}

/// Release a pending offer. The unit goes to the next waiting user.
pub async fn release_offer(
    State(state): State<AppState>,
    Path((event_id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .release(EventId::from_uuid(event_id), EntryId::from_uuid(entry_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Redeem a live offer for a ticket.
pub async fn confirm_purchase(
    State(state): State<AppState>,
    Path((event_id, entry_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    let ticket = state
        .service
        .confirm_purchase(EventId::from_uuid(event_id), EntryId::from_uuid(entry_id))
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// Get the ticket a user bought for the event.
///
/// Returns 404 when the user holds no ticket.
pub async fn get_ticket(
    State(state): State<AppState>,
    Path((event_id, user_id)): Path<(Uuid, String)>,
) -> Result<Json<Ticket>, AppError> {
    let user = UserId::new(user_id);
    let ticket = state
        .service
        .ticket_for(EventId::from_uuid(event_id), &user)
        .await?
        .ok_or_else(|| AppError::not_found("Ticket for user", &user))?;
    Ok(Json(ticket))
}
