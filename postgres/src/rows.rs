//! Row decoding and `sqlx` error mapping.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;
use waitline_core::error::StoreError;
use waitline_core::store::ExpiryTimer;
use waitline_core::types::{
    Capacity, EntryId, EntryStatus, Event, EventId, Ticket, TicketId, TicketStatus, TimerId,
    UserId, WaitingListEntry,
};

/// `serialization_failure`
const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
const DEADLOCK_DETECTED: &str = "40P01";
/// `unique_violation`
const UNIQUE_VIOLATION: &str = "23505";

/// Map a `sqlx` error onto the store error taxonomy.
///
/// Serialization failures, deadlocks and unique violations mean a concurrent
/// transaction won; re-running the whole transaction resolves them, so they
/// become the retryable [`StoreError::Conflict`].
pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            match code.as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | UNIQUE_VIOLATION) => {
                    metrics::counter!("waitline.store.conflicts").increment(1);
                    tracing::debug!(code = ?code, error = %db, "Transaction lost to a concurrent writer");
                    StoreError::Conflict(db.message().to_string())
                }
                _ => StoreError::Database(err.to_string()),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(map_sqlx)
}

pub(crate) fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let capacity: i32 = get(row, "total_capacity")?;
    let capacity = u32::try_from(capacity).map_err(|_| {
        StoreError::Serialization(format!("negative capacity {capacity}"))
    })?;

    Ok(Event {
        id: EventId::from_uuid(get::<Uuid>(row, "id")?),
        name: get(row, "name")?,
        total_capacity: Capacity::new(capacity),
        is_cancelled: get(row, "is_cancelled")?,
        created_at: get(row, "created_at")?,
        owner_id: get::<Option<String>>(row, "owner_id")?.map(UserId::new),
        starts_at: get::<Option<DateTime<Utc>>>(row, "starts_at")?,
    })
}

pub(crate) fn entry_from_row(row: &PgRow) -> Result<WaitingListEntry, StoreError> {
    let status: String = get(row, "status")?;
    let status = EntryStatus::parse(&status)
        .ok_or_else(|| StoreError::Serialization(format!("unknown entry status {status}")))?;
    let sequence: i64 = get(row, "sequence")?;
    let sequence = u64::try_from(sequence)
        .map_err(|_| StoreError::Serialization(format!("negative sequence {sequence}")))?;

    Ok(WaitingListEntry {
        id: EntryId::from_uuid(get::<Uuid>(row, "id")?),
        event_id: EventId::from_uuid(get::<Uuid>(row, "event_id")?),
        user_id: UserId::new(get::<String>(row, "user_id")?),
        status,
        offer_expires_at: get::<Option<DateTime<Utc>>>(row, "offer_expires_at")?,
        created_at: get(row, "created_at")?,
        sequence,
    })
}

pub(crate) fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = get(row, "status")?;
    let status = TicketStatus::parse(&status)
        .ok_or_else(|| StoreError::Serialization(format!("unknown ticket status {status}")))?;

    Ok(Ticket {
        id: TicketId::from_uuid(get::<Uuid>(row, "id")?),
        event_id: EventId::from_uuid(get::<Uuid>(row, "event_id")?),
        user_id: UserId::new(get::<String>(row, "user_id")?),
        entry_id: EntryId::from_uuid(get::<Uuid>(row, "entry_id")?),
        status,
        issued_at: get(row, "issued_at")?,
    })
}

pub(crate) fn timer_from_row(row: &PgRow) -> Result<ExpiryTimer, StoreError> {
    let attempts: i32 = get(row, "attempts")?;

    Ok(ExpiryTimer {
        id: TimerId::from_uuid(get::<Uuid>(row, "id")?),
        entry_id: EntryId::from_uuid(get::<Uuid>(row, "entry_id")?),
        event_id: EventId::from_uuid(get::<Uuid>(row, "event_id")?),
        fire_at: get(row, "fire_at")?,
        attempts: u32::try_from(attempts).unwrap_or(0),
    })
}

/// Sequence numbers are stored as `BIGINT`.
pub(crate) fn sequence_param(sequence: u64) -> Result<i64, StoreError> {
    i64::try_from(sequence)
        .map_err(|_| StoreError::Serialization(format!("sequence {sequence} out of range")))
}
