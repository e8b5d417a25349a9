//! Admission service - the imperative shell around [`QueueReducer`].
//!
//! Every mutating operation runs as one transaction:
//!
//! 1. `begin(event_id)` takes the event's lock
//! 2. `load()` reads the event with its entries and tickets
//! 3. the reducer runs; `Dispatch` effects are fed back until none remain
//! 4. row writes and armed timers go through the same transaction
//! 5. `commit()`
//!
//! A rejected action drops the transaction, so nothing is written. Retryable
//! store failures re-run the whole sequence under the configured
//! [`RetryPolicy`].

use crate::metrics::AdmissionMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use waitline_core::config::AdmissionConfig;
use waitline_core::environment::{Clock, QueueEnvironment};
use waitline_core::error::{AdmissionError, Result};
use waitline_core::ledger::Availability;
use waitline_core::position::{self, QueuePosition};
use waitline_core::queue::{
    JoinOutcome, QueueAction, QueueEffect, QueueReducer, QueueReply, QueueState,
};
use waitline_core::rate_limit::RateLimiter;
use waitline_core::reducer::Reducer;
use waitline_core::store::QueueStore;
use waitline_core::types::{
    Capacity, EntryId, EntryStatus, Event, EventId, NewEvent, Ticket, UserId,
};

/// Longest accepted event name.
pub const MAX_EVENT_NAME_LEN: usize = 200;

/// What one committed transaction did.
#[derive(Debug, Default)]
struct Committed {
    reply: Option<QueueReply>,
    promoted: u64,
    terminated: bool,
}

/// Entry point for all admission operations.
///
/// Cheap to clone; clones share the store, limiter and clock.
#[derive(Clone)]
pub struct AdmissionService {
    store: Arc<dyn QueueStore>,
    limiter: Arc<dyn RateLimiter>,
    reducer: QueueReducer,
    env: QueueEnvironment,
    config: AdmissionConfig,
    retry: RetryPolicy,
}

impl AdmissionService {
    /// Create a service over `store`, throttling joins through `limiter`.
    #[must_use]
    pub fn new(
        store: Arc<dyn QueueStore>,
        limiter: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            reducer: QueueReducer::new(),
            env: QueueEnvironment::from_config(clock, &config),
            config,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy for transient store failures.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The clock the service reads "now" from.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.env.clock
    }

    /// Admission policy in effect.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Create an event with a fixed capacity and no owner or start time.
    ///
    /// # Errors
    ///
    /// See [`AdmissionService::create_event_with`].
    pub async fn create_event(&self, name: &str, capacity: u32) -> Result<Event> {
        self.create_event_with(NewEvent::new(name, capacity)).await
    }

    /// Create an event from caller-supplied fields.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Validation`] for an empty or overlong name,
    /// zero capacity, an empty owner id or a start time that is not in the
    /// future, or [`AdmissionError::Store`] if the insert fails.
    #[tracing::instrument(skip(self, draft), fields(capacity = draft.total_capacity))]
    pub async fn create_event_with(&self, draft: NewEvent) -> Result<Event> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(AdmissionError::Validation("event name must not be empty".into()));
        }
        if name.len() > MAX_EVENT_NAME_LEN {
            return Err(AdmissionError::Validation(format!(
                "event name must be at most {MAX_EVENT_NAME_LEN} bytes"
            )));
        }
        if draft.total_capacity == 0 {
            return Err(AdmissionError::Validation("capacity must be at least 1".into()));
        }
        if draft
            .owner_id
            .as_ref()
            .is_some_and(|owner| owner.as_str().trim().is_empty())
        {
            return Err(AdmissionError::Validation("owner id must not be empty".into()));
        }

        let now = self.env.clock.now();
        let mut event = Event::new(name, Capacity::new(draft.total_capacity), now);
        if let Some(owner_id) = draft.owner_id {
            event = event.with_owner(owner_id);
        }
        if let Some(starts_at) = draft.starts_at {
            if starts_at <= now {
                return Err(AdmissionError::Validation(
                    "event must start in the future".into(),
                ));
            }
            event = event.with_start(starts_at);
        }

        self.store.create_event(&event).await?;
        tracing::info!(
            event_id = %event.id,
            capacity = draft.total_capacity,
            starts_at = ?event.starts_at,
            "Event created"
        );
        Ok(event)
    }

    /// Load one event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if it does not exist.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))
    }

    /// List events that have not been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] if the query fails.
    pub async fn list_events(&self) -> Result<Vec<Event>> {
        Ok(self.store.list_events().await?)
    }

    /// Cancel an event. Later joins are rejected and freed capacity is no
    /// longer promoted; pending offers run out normally.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if it does not exist.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn cancel_event(&self, event_id: EventId) -> Result<Event> {
        self.execute("cancel", event_id, QueueAction::Cancel).await?;
        tracing::info!(event_id = %event_id, "Event cancelled");
        self.get_event(event_id).await
    }

    // ========================================================================
    // Queue operations
    // ========================================================================

    /// Join the waiting list, receiving an offer right away if capacity is
    /// free.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::Throttled`] if `user_id` joined too often
    /// - [`AdmissionError::AlreadyQueued`] if `user_id` holds a non-expired entry
    /// - [`AdmissionError::EventNotFound`] / [`AdmissionError::EventCancelled`]
    /// - [`AdmissionError::EventPassed`] once the event has started
    /// - [`AdmissionError::OwnEvent`] if `user_id` organizes the event
    #[tracing::instrument(skip(self), fields(event_id = %event_id, user_id = %user_id))]
    pub async fn join(&self, event_id: EventId, user_id: UserId) -> Result<JoinOutcome> {
        if user_id.as_str().trim().is_empty() {
            return Err(AdmissionError::Validation("user id must not be empty".into()));
        }

        if self.config.join_limit_enabled() {
            if let Err(err) = self
                .limiter
                .check_and_record(user_id.as_str(), self.config.join_limit, self.config.join_window())
                .await
            {
                AdmissionMetrics::record_join(join_label(&err));
                return Err(err);
            }
        }

        let result = self
            .execute("join", event_id, QueueAction::Join { user_id })
            .await;

        match result {
            Ok(Some(QueueReply::Joined(outcome))) => {
                AdmissionMetrics::record_join(outcome.status.as_str());
                tracing::info!(
                    event_id = %event_id,
                    entry_id = %outcome.entry.id,
                    status = %outcome.status,
                    "Joined waiting list"
                );
                Ok(outcome)
            }
            Ok(_) => Err(unexpected_reply("join")),
            Err(err) => {
                AdmissionMetrics::record_join(join_label(&err));
                Err(err)
            }
        }
    }

    /// Give up a pending offer; the freed unit goes to the next waiting user.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NoActiveOffer`] if the entry does not exist
    /// for this event or is not currently offered.
    #[tracing::instrument(skip(self), fields(event_id = %event_id, entry_id = %entry_id))]
    pub async fn release(&self, event_id: EventId, entry_id: EntryId) -> Result<()> {
        self.execute("release", event_id, QueueAction::Release { entry_id })
            .await?;
        AdmissionMetrics::record_released();
        tracing::info!(event_id = %event_id, entry_id = %entry_id, "Offer released");
        Ok(())
    }

    /// Timer callback: expire the offer if it is still pending.
    ///
    /// Idempotent. Missing events or entries and entries no longer offered
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::Store`] if the transaction fails.
    #[tracing::instrument(skip(self), fields(event_id = %event_id, entry_id = %entry_id))]
    pub async fn expire(&self, entry_id: EntryId, event_id: EventId) -> Result<()> {
        match self
            .execute_tracked("expire", event_id, QueueAction::Expire { entry_id })
            .await
        {
            Ok(committed) => {
                if committed.terminated {
                    AdmissionMetrics::record_expired();
                    tracing::info!(event_id = %event_id, entry_id = %entry_id, "Offer expired");
                } else {
                    tracing::debug!(entry_id = %entry_id, "Expiry ignored, entry no longer offered");
                }
                Ok(())
            }
            Err(AdmissionError::EventNotFound(_)) => {
                tracing::debug!(event_id = %event_id, "Expiry ignored, event no longer exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Offer free capacity to waiting entries in FIFO order.
    ///
    /// Release and expiry already promote in their own transaction; this is
    /// for callers that change capacity out of band (e.g. a refund).
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
    #[tracing::instrument(skip(self), fields(event_id = %event_id))]
    pub async fn promote(&self, event_id: EventId) -> Result<()> {
        self.execute("promote", event_id, QueueAction::Promote).await?;
        Ok(())
    }

    /// Redeem a live offer for a ticket.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::NoActiveOffer`] if the entry is not offered
    /// - [`AdmissionError::OfferLapsed`] if its window has passed
    /// - [`AdmissionError::EventNotFound`] if the event does not exist
    #[tracing::instrument(skip(self), fields(event_id = %event_id, entry_id = %entry_id))]
    pub async fn confirm_purchase(&self, event_id: EventId, entry_id: EntryId) -> Result<Ticket> {
        match self
            .execute("purchase", event_id, QueueAction::ConfirmPurchase { entry_id })
            .await?
        {
            Some(QueueReply::Purchased(ticket)) => {
                AdmissionMetrics::record_purchase();
                tracing::info!(
                    event_id = %event_id,
                    entry_id = %entry_id,
                    ticket_id = %ticket.id,
                    "Purchase confirmed"
                );
                Ok(ticket)
            }
            _ => Err(unexpected_reply("purchase")),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current availability, recomputed from records.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
    pub async fn availability(&self, event_id: EventId) -> Result<Availability> {
        let snapshot = self
            .store
            .snapshot(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))?;
        Ok(Availability::compute(
            &snapshot.event,
            &snapshot.entries,
            &snapshot.tickets,
            self.env.clock.now(),
        ))
    }

    /// The user's active entry and rank, or `None` if they have none.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
    pub async fn position(
        &self,
        event_id: EventId,
        user_id: &UserId,
    ) -> Result<Option<QueuePosition>> {
        let snapshot = self
            .store
            .snapshot(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))?;
        Ok(position::locate(&snapshot.entries, user_id))
    }

    /// The user's ticket for the event, or `None` if they never bought one.
    ///
    /// A user who bought more than once (after a refund, say) gets the most
    /// recently issued ticket.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
    pub async fn ticket_for(&self, event_id: EventId, user_id: &UserId) -> Result<Option<Ticket>> {
        let snapshot = self
            .store
            .snapshot(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))?;
        Ok(snapshot
            .tickets
            .into_iter()
            .filter(|ticket| &ticket.user_id == user_id)
            .max_by_key(|ticket| ticket.issued_at))
    }

    // ========================================================================
    // Transaction loop
    // ========================================================================

    async fn execute(
        &self,
        operation: &'static str,
        event_id: EventId,
        action: QueueAction,
    ) -> Result<Option<QueueReply>> {
        Ok(self.execute_tracked(operation, event_id, action).await?.reply)
    }

    async fn execute_tracked(
        &self,
        operation: &'static str,
        event_id: EventId,
        action: QueueAction,
    ) -> Result<Committed> {
        let started = Instant::now();
        let result = retry_with_predicate(
            &self.retry,
            || self.run_transaction(event_id, action.clone()),
            AdmissionError::is_retryable,
        )
        .await;
        AdmissionMetrics::record_transaction(operation, started.elapsed());

        let committed = result?;
        AdmissionMetrics::record_promoted(committed.promoted);
        if committed.promoted > 0 {
            tracing::info!(
                event_id = %event_id,
                promoted = committed.promoted,
                "Promoted waiting entries"
            );
        }
        Ok(committed)
    }

    async fn run_transaction(&self, event_id: EventId, action: QueueAction) -> Result<Committed> {
        let mut tx = self.store.begin(event_id).await?;
        let snapshot = tx
            .load()
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))?;
        let mut state = QueueState::from(snapshot);

        let mut committed = Committed::default();
        let mut pending = VecDeque::from([action]);
        let mut is_root = true;
        while let Some(action) = pending.pop_front() {
            let effects = self.reducer.reduce(&mut state, action, &self.env)?;

            for effect in effects {
                match effect {
                    QueueEffect::InsertEntry(entry) => tx.insert_entry(&entry).await?,
                    QueueEffect::UpdateEntry(entry) => {
                        // Only promotion turns an existing entry into an offer
                        if entry.status == EntryStatus::Offered {
                            committed.promoted += 1;
                        }
                        if is_root && entry.status == EntryStatus::Expired {
                            committed.terminated = true;
                        }
                        tx.update_entry(&entry).await?;
                    }
                    QueueEffect::IssueTicket(ticket) => tx.insert_ticket(&ticket).await?,
                    QueueEffect::UpdateEvent(event) => tx.update_event(&event).await?,
                    QueueEffect::ArmExpiry(request) => {
                        let timer_id = tx.arm_expiry(&request).await?;
                        tracing::debug!(
                            timer_id = %timer_id,
                            entry_id = %request.entry_id,
                            fire_at = %request.fire_at,
                            "Armed expiry timer"
                        );
                    }
                    QueueEffect::Dispatch(next) => pending.push_back(next),
                    QueueEffect::Reply(reply) => committed.reply = Some(reply),
                }
            }
            is_root = false;
        }

        tx.commit().await?;
        Ok(committed)
    }
}

impl std::fmt::Debug for AdmissionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionService")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Metric label for a failed join.
const fn join_label(err: &AdmissionError) -> &'static str {
    match err {
        AdmissionError::AlreadyQueued { .. } => "conflict",
        AdmissionError::Throttled { .. } => "throttled",
        _ => "rejected",
    }
}

fn unexpected_reply(operation: &str) -> AdmissionError {
    tracing::error!(operation, "Reducer produced no reply");
    AdmissionError::Store(waitline_core::StoreError::Serialization(format!(
        "{operation} produced no reply"
    )))
}
