//! `PostgreSQL` implementation of [`QueueStore`] and its per-event transactions.

use crate::rows::{entry_from_row, event_from_row, map_sqlx, sequence_param, ticket_from_row};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use waitline_core::error::StoreError;
use waitline_core::store::{EventTransaction, ExpiryRequest, QueueSnapshot, QueueStore};
use waitline_core::types::{Event, EventId, Ticket, TimerId, UserId, WaitingListEntry};

const SELECT_EVENT: &str = r"
    SELECT id, name, total_capacity, is_cancelled, created_at, owner_id, starts_at
    FROM events
    WHERE id = $1
";

const SELECT_ENTRIES: &str = r"
    SELECT id, event_id, user_id, status, offer_expires_at, created_at, sequence
    FROM waiting_list_entries
    WHERE event_id = $1
    ORDER BY sequence
";

const SELECT_TICKETS: &str = r"
    SELECT id, event_id, user_id, entry_id, status, issued_at
    FROM tickets
    WHERE event_id = $1
    ORDER BY issued_at
";

/// Pool sizing for [`PostgresQueueStore::connect_with`].
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// `PostgreSQL`-backed queue store.
///
/// Mutating transactions lock the event row with `SELECT … FOR UPDATE` as
/// their first statement. Transactions run at `READ COMMITTED`, so every read
/// after the lock sees all transactions that held it before. Expiry timers
/// live in `expiry_timers` and are written through the same transaction as
/// the offer they guard.
///
/// # Example
///
/// ```no_run
/// use waitline_postgres::PostgresQueueStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresQueueStore::connect("postgres://localhost/waitline").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Self::connect_with(database_url, &PoolSettings::default()).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect_with(
        database_url: &str,
        settings: &PoolSettings,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

async fn load_snapshot(
    conn: &mut PgConnection,
    event_id: EventId,
) -> Result<Option<QueueSnapshot>, StoreError> {
    let Some(row) = sqlx::query(SELECT_EVENT)
        .bind(event_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(map_sqlx)?
    else {
        return Ok(None);
    };
    let event = event_from_row(&row)?;

    let entries = sqlx::query(SELECT_ENTRIES)
        .bind(event_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?
        .iter()
        .map(entry_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    let tickets = sqlx::query(SELECT_TICKETS)
        .bind(event_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx)?
        .iter()
        .map(ticket_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(QueueSnapshot {
        event,
        entries,
        tickets,
    }))
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn create_event(&self, event: &Event) -> Result<(), StoreError> {
        let capacity = i32::try_from(event.total_capacity.value()).map_err(|_| {
            StoreError::Serialization(format!(
                "capacity {} out of range",
                event.total_capacity.value()
            ))
        })?;

        sqlx::query(
            r"
            INSERT INTO events
                (id, name, total_capacity, is_cancelled, created_at, owner_id, starts_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.name)
        .bind(capacity)
        .bind(event.is_cancelled)
        .bind(event.created_at)
        .bind(event.owner_id.as_ref().map(UserId::as_str))
        .bind(event.starts_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        sqlx::query(SELECT_EVENT)
            .bind(event_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .as_ref()
            .map(event_from_row)
            .transpose()
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let rows: Vec<PgRow> = sqlx::query(
            r"
            SELECT id, name, total_capacity, is_cancelled, created_at, owner_id, starts_at
            FROM events
            WHERE NOT is_cancelled
            ORDER BY created_at
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter().map(event_from_row).collect()
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<QueueSnapshot>, StoreError> {
        // One REPEATABLE READ transaction so the three reads agree
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let snapshot = load_snapshot(&mut tx, event_id).await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(snapshot)
    }

    async fn begin(&self, event_id: EventId) -> Result<Box<dyn EventTransaction>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("SELECT id FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        Ok(Box::new(PostgresTransaction { tx, event_id }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Open transaction holding one event row lock.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    event_id: EventId,
}

#[async_trait]
impl EventTransaction for PostgresTransaction {
    async fn load(&mut self) -> Result<Option<QueueSnapshot>, StoreError> {
        load_snapshot(&mut self.tx, self.event_id).await
    }

    async fn update_event(&mut self, event: &Event) -> Result<(), StoreError> {
        sqlx::query("UPDATE events SET is_cancelled = $2 WHERE id = $1")
            .bind(event.id.as_uuid())
            .bind(event.is_cancelled)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO waiting_list_entries
                (id, event_id, user_id, status, offer_expires_at, created_at, sequence)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.event_id.as_uuid())
        .bind(entry.user_id.as_str())
        .bind(entry.status.as_str())
        .bind(entry.offer_expires_at)
        .bind(entry.created_at)
        .bind(sequence_param(entry.sequence)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE waiting_list_entries
            SET status = $2, offer_expires_at = $3
            WHERE id = $1
            ",
        )
        .bind(entry.id.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.offer_expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("entry {} does not exist", entry.id)));
        }
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tickets (id, event_id, user_id, entry_id, status, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.event_id.as_uuid())
        .bind(ticket.user_id.as_str())
        .bind(ticket.entry_id.as_uuid())
        .bind(ticket.status.as_str())
        .bind(ticket.issued_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn arm_expiry(&mut self, request: &ExpiryRequest) -> Result<TimerId, StoreError> {
        let timer_id = TimerId::new();
        sqlx::query(
            r"
            INSERT INTO expiry_timers (id, entry_id, event_id, fire_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(timer_id.as_uuid())
        .bind(request.entry_id.as_uuid())
        .bind(request.event_id.as_uuid())
        .bind(request.fire_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(timer_id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}
