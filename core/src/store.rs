//! Persistence abstractions.
//!
//! The admission controller treats its database as a transactional store
//! with two access modes:
//!
//! - **Queries** ([`QueueStore::snapshot`], [`QueueStore::list_events`]) read a
//!   consistent snapshot and need no isolation beyond that.
//! - **Mutations** go through an [`EventTransaction`] opened by
//!   [`QueueStore::begin`]. A transaction serializes against every other
//!   transaction for the same event (never globally), so the capacity recount
//!   and the writes that depend on it are atomic.
//!
//! Expiry timers are armed through the same transaction as the offer they
//! guard and are consumed by a worker through [`TimerQueue`].
//!
//! # Implementations
//!
//! - `PostgresQueueStore` (in `waitline-postgres`): production
//! - `InMemoryQueueStore` (in `waitline-testing`): fast, deterministic tests
//!
//! # Dyn Compatibility
//!
//! The traits use `async_trait` so the runtime can hold `Arc<dyn QueueStore>`.

use crate::error::StoreError;
use crate::types::{EntryId, Event, EventId, Ticket, TimerId, WaitingListEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the reducer needs to know about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// The event
    pub event: Event,
    /// All entries for the event, including terminated ones, in insertion order
    pub entries: Vec<WaitingListEntry>,
    /// All tickets for the event
    pub tickets: Vec<Ticket>,
}

impl QueueSnapshot {
    /// Sequence number the next inserted entry must take.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.sequence)
            .max()
            .map_or(1, |max| max + 1)
    }
}

/// Request to fire `expire(entry_id, event_id)` at `fire_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryRequest {
    /// Entry whose offer the timer guards
    pub entry_id: EntryId,
    /// Event the entry belongs to
    pub event_id: EventId,
    /// Earliest instant the timer may fire
    pub fire_at: DateTime<Utc>,
}

/// An armed timer as stored in the durable timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryTimer {
    /// Timer identifier
    pub id: TimerId,
    /// Entry whose offer the timer guards
    pub entry_id: EntryId,
    /// Event the entry belongs to
    pub event_id: EventId,
    /// Earliest instant the timer may fire
    pub fire_at: DateTime<Utc>,
    /// How many times the timer has been handed to a worker
    pub attempts: u32,
}

/// Store for events, waiting-list entries and tickets.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    async fn create_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Load one event without its queue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError>;

    /// List events that have not been cancelled, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;

    /// Read-only snapshot of an event and its queue. `None` if the event
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn snapshot(&self, event_id: EventId) -> Result<Option<QueueSnapshot>, StoreError>;

    /// Open a transaction serialized against all other transactions on
    /// `event_id`.
    ///
    /// Dropping the transaction without committing discards its writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the transaction cannot be started.
    async fn begin(&self, event_id: EventId) -> Result<Box<dyn EventTransaction>, StoreError>;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if it is not.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// A serialized unit of work on one event.
#[async_trait]
pub trait EventTransaction: Send {
    /// Load the event and its queue as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn load(&mut self) -> Result<Option<QueueSnapshot>, StoreError>;

    /// Overwrite the event row (only the cancellation flag may change).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    async fn update_event(&mut self, event: &Event) -> Result<(), StoreError>;

    /// Insert a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    async fn insert_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError>;

    /// Overwrite an existing entry's status and offer expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails.
    async fn update_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError>;

    /// Insert a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError>;

    /// Durably arm an expiry timer. It becomes visible to workers only if the
    /// transaction commits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the insert fails.
    async fn arm_expiry(&mut self, request: &ExpiryRequest) -> Result<TimerId, StoreError>;

    /// Commit all writes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a concurrent transaction forced a
    /// rollback, or another [`StoreError`] if the commit fails.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Durable queue of armed expiry timers.
///
/// Delivery is at-least-once: a claimed timer that is never completed is
/// handed out again once its lease lapses.
#[async_trait]
pub trait TimerQueue: Send + Sync {
    /// Lease up to `limit` timers whose `fire_at` is at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: chrono::Duration,
    ) -> Result<Vec<ExpiryTimer>, StoreError>;

    /// Remove a timer after its callback ran.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the delete fails.
    async fn complete(&self, timer_id: TimerId) -> Result<(), StoreError>;

    /// Number of timers not yet completed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    async fn pending(&self) -> Result<usize, StoreError>;
}
