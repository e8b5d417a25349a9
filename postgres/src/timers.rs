//! Durable expiry timers in the `expiry_timers` table.

use crate::rows::{map_sqlx, timer_from_row};
use crate::store::PostgresQueueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use waitline_core::error::StoreError;
use waitline_core::store::{ExpiryTimer, TimerQueue};
use waitline_core::types::TimerId;

#[async_trait]
impl TimerQueue for PostgresQueueStore {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: chrono::Duration,
    ) -> Result<Vec<ExpiryTimer>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        // SKIP LOCKED lets several workers poll without blocking each other
        let rows = sqlx::query(
            r"
            UPDATE expiry_timers
            SET leased_until = $2, attempts = attempts + 1
            WHERE id IN (
                SELECT id
                FROM expiry_timers
                WHERE fire_at <= $1
                  AND (leased_until IS NULL OR leased_until <= $1)
                ORDER BY fire_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, entry_id, event_id, fire_at, attempts
            ",
        )
        .bind(now)
        .bind(now + lease)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx)?;

        let mut timers = rows
            .iter()
            .map(timer_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        timers.sort_by_key(|timer| timer.fire_at);

        if !timers.is_empty() {
            tracing::debug!(claimed = timers.len(), "Claimed due expiry timers");
        }
        Ok(timers)
    }

    async fn complete(&self, timer_id: TimerId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM expiry_timers WHERE id = $1")
            .bind(timer_id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn pending(&self) -> Result<usize, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM expiry_timers")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
