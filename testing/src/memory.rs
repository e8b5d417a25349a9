//! In-memory queue store for tests.
//!
//! Implements [`QueueStore`] and [`TimerQueue`] with the same concurrency
//! contract as the Postgres store: a transaction holds its event's async
//! mutex from `begin` until commit or drop, writes are buffered and become
//! visible only on commit, and timers are leased to the worker that claimed
//! them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use waitline_core::error::StoreError;
use waitline_core::store::{
    EventTransaction, ExpiryRequest, ExpiryTimer, QueueSnapshot, QueueStore, TimerQueue,
};
use waitline_core::types::{EntryId, Event, EventId, Ticket, TimerId, WaitingListEntry};

#[derive(Debug, Default)]
struct Tables {
    events: Vec<Event>,
    entries: Vec<WaitingListEntry>,
    tickets: Vec<Ticket>,
    timers: Vec<LeasedTimer>,
}

#[derive(Debug, Clone, Copy)]
struct LeasedTimer {
    timer: ExpiryTimer,
    leased_until: Option<DateTime<Utc>>,
}

impl Tables {
    fn snapshot(&self, event_id: EventId) -> Option<QueueSnapshot> {
        let event = self.events.iter().find(|event| event.id == event_id)?.clone();
        let mut entries: Vec<WaitingListEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.event_id == event_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        let tickets = self
            .tickets
            .iter()
            .filter(|ticket| ticket.event_id == event_id)
            .cloned()
            .collect();
        Some(QueueSnapshot {
            event,
            entries,
            tickets,
        })
    }

    fn upsert_entry(&mut self, entry: WaitingListEntry) {
        match self.entries.iter_mut().find(|existing| existing.id == entry.id) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn upsert_event(&mut self, event: Event) {
        match self.events.iter_mut().find(|existing| existing.id == event.id) {
            Some(existing) => *existing = event,
            None => self.events.push(event),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    locks: Mutex<HashMap<EventId, Arc<Mutex<()>>>>,
    injected_conflicts: AtomicUsize,
    commits: AtomicUsize,
}

/// In-memory store with per-event serialization.
///
/// Cloning is cheap; clones share the same data.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryQueueStore::new();
/// let service = AdmissionService::new(
///     Arc::new(store.clone()),
///     Arc::new(store.clone()),
///     ...
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    shared: Arc<Shared>,
}

impl InMemoryQueueStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with [`StoreError::Conflict`],
    /// the way a serialization failure would.
    pub fn inject_conflicts(&self, count: usize) {
        self.shared.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of transactions committed so far
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// All entries for `event_id`, in insertion order
    pub async fn entries(&self, event_id: EventId) -> Vec<WaitingListEntry> {
        self.shared
            .tables
            .read()
            .await
            .snapshot(event_id)
            .map(|snapshot| snapshot.entries)
            .unwrap_or_default()
    }

    /// Look up one entry
    pub async fn entry(&self, entry_id: EntryId) -> Option<WaitingListEntry> {
        self.shared
            .tables
            .read()
            .await
            .entries
            .iter()
            .find(|entry| entry.id == entry_id)
            .cloned()
    }

    /// All tickets for `event_id`
    pub async fn tickets(&self, event_id: EventId) -> Vec<Ticket> {
        self.shared
            .tables
            .read()
            .await
            .tickets
            .iter()
            .filter(|ticket| ticket.event_id == event_id)
            .cloned()
            .collect()
    }

    /// Insert a ticket directly, bypassing the reducer (e.g. a sale made
    /// outside the waiting list, or a refunded one)
    pub async fn put_ticket(&self, ticket: Ticket) {
        self.shared.tables.write().await.tickets.push(ticket);
    }

    /// All timers not yet completed
    pub async fn timers(&self) -> Vec<ExpiryTimer> {
        self.shared
            .tables
            .read()
            .await
            .timers
            .iter()
            .map(|leased| leased.timer)
            .collect()
    }

    async fn event_lock(&self, event_id: EventId) -> Arc<Mutex<()>> {
        let mut locks = self.shared.locks.lock().await;
        Arc::clone(locks.entry(event_id).or_default())
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn create_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut tables = self.shared.tables.write().await;
        if tables.events.iter().any(|existing| existing.id == event.id) {
            return Err(StoreError::Database(format!(
                "duplicate key value violates unique constraint: event {}",
                event.id
            )));
        }
        tables.events.push(event.clone());
        Ok(())
    }

    async fn get_event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self
            .shared
            .tables
            .read()
            .await
            .events
            .iter()
            .find(|event| event.id == event_id)
            .cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let tables = self.shared.tables.read().await;
        let mut events: Vec<Event> = tables
            .events
            .iter()
            .filter(|event| !event.is_cancelled)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.created_at);
        Ok(events)
    }

    async fn snapshot(&self, event_id: EventId) -> Result<Option<QueueSnapshot>, StoreError> {
        Ok(self.shared.tables.read().await.snapshot(event_id))
    }

    async fn begin(&self, event_id: EventId) -> Result<Box<dyn EventTransaction>, StoreError> {
        let guard = self.event_lock(event_id).await.lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            event_id,
            _guard: guard,
            pending: Pending::default(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl TimerQueue for InMemoryQueueStore {
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: chrono::Duration,
    ) -> Result<Vec<ExpiryTimer>, StoreError> {
        let mut tables = self.shared.tables.write().await;
        tables.timers.sort_by_key(|leased| leased.timer.fire_at);

        let mut claimed = Vec::new();
        for leased in &mut tables.timers {
            if claimed.len() >= limit {
                break;
            }
            let due = leased.timer.fire_at <= now;
            let free = leased.leased_until.is_none_or(|until| until <= now);
            if due && free {
                leased.leased_until = Some(now + lease);
                leased.timer.attempts += 1;
                claimed.push(leased.timer);
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, timer_id: TimerId) -> Result<(), StoreError> {
        self.shared
            .tables
            .write()
            .await
            .timers
            .retain(|leased| leased.timer.id != timer_id);
        Ok(())
    }

    async fn pending(&self) -> Result<usize, StoreError> {
        Ok(self.shared.tables.read().await.timers.len())
    }
}

#[derive(Debug, Default)]
struct Pending {
    event: Option<Event>,
    entries: Vec<WaitingListEntry>,
    tickets: Vec<Ticket>,
    timers: Vec<ExpiryTimer>,
}

/// Transaction holding one event's lock.
struct InMemoryTransaction {
    shared: Arc<Shared>,
    event_id: EventId,
    _guard: OwnedMutexGuard<()>,
    pending: Pending,
}

impl InMemoryTransaction {
    fn stage_entry(&mut self, entry: &WaitingListEntry) {
        match self.pending.entries.iter_mut().find(|staged| staged.id == entry.id) {
            Some(staged) => *staged = entry.clone(),
            None => self.pending.entries.push(entry.clone()),
        }
    }
}

#[async_trait]
impl EventTransaction for InMemoryTransaction {
    async fn load(&mut self) -> Result<Option<QueueSnapshot>, StoreError> {
        let tables = self.shared.tables.read().await;
        let Some(mut snapshot) = tables.snapshot(self.event_id) else {
            return Ok(None);
        };
        drop(tables);

        if let Some(event) = &self.pending.event {
            snapshot.event = event.clone();
        }
        for staged in &self.pending.entries {
            match snapshot.entries.iter_mut().find(|entry| entry.id == staged.id) {
                Some(entry) => *entry = staged.clone(),
                None => snapshot.entries.push(staged.clone()),
            }
        }
        snapshot.tickets.extend(self.pending.tickets.iter().cloned());
        Ok(Some(snapshot))
    }

    async fn update_event(&mut self, event: &Event) -> Result<(), StoreError> {
        self.pending.event = Some(event.clone());
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError> {
        self.stage_entry(entry);
        Ok(())
    }

    async fn update_entry(&mut self, entry: &WaitingListEntry) -> Result<(), StoreError> {
        self.stage_entry(entry);
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError> {
        self.pending.tickets.push(ticket.clone());
        Ok(())
    }

    async fn arm_expiry(&mut self, request: &ExpiryRequest) -> Result<TimerId, StoreError> {
        let timer = ExpiryTimer {
            id: TimerId::new(),
            entry_id: request.entry_id,
            event_id: request.event_id,
            fire_at: request.fire_at,
            attempts: 0,
        };
        self.pending.timers.push(timer);
        Ok(timer.id)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let injected = self.shared.injected_conflicts.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |remaining| remaining.checked_sub(1),
        );
        if injected.is_ok() {
            return Err(StoreError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        let Self {
            shared, pending, ..
        } = *self;
        let mut tables = shared.tables.write().await;
        if let Some(event) = pending.event {
            tables.upsert_event(event);
        }
        for entry in pending.entries {
            tables.upsert_entry(entry);
        }
        tables.tickets.extend(pending.tickets);
        tables.timers.extend(pending.timers.into_iter().map(|timer| LeasedTimer {
            timer,
            leased_until: None,
        }));
        drop(tables);

        shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
