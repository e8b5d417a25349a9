//! Queue admission engine.
//!
//! The waiting-list state machine for one event, written as a pure
//! [`Reducer`]. Each action is applied to a [`QueueState`] loaded inside a
//! per-event transaction; the returned [`QueueEffect`]s tell the runtime which
//! rows to write, which expiry timers to arm and which follow-up action to
//! feed back in.
//!
//! ```text
//! join ──▶ offered ──confirm_purchase──▶ purchased
//!   │         │
//!   │         └──release / expire──▶ expired ──▶ Dispatch(Promote)
//!   ▼
//! waiting ──promote──▶ offered
//! ```
//!
//! A rejected action returns an error and leaves the state untouched.

use crate::environment::QueueEnvironment;
use crate::error::AdmissionError;
use crate::ledger::Availability;
use crate::reducer::Reducer;
use crate::store::{ExpiryRequest, QueueSnapshot};
use crate::types::{
    EntryId, EntryStatus, Event, Ticket, TicketId, TicketStatus, UserId, WaitingListEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

/// Message returned when a join is parked in the queue.
pub const WAITING_MESSAGE: &str = "You have been added to the waiting list.";

// ============================================================================
// State
// ============================================================================

/// One event and its queue, as seen inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueState {
    /// The event
    pub event: Event,
    /// Every entry for the event, terminated ones included
    pub entries: Vec<WaitingListEntry>,
    /// Every ticket for the event
    pub tickets: Vec<Ticket>,
    /// Sequence number the next inserted entry takes
    pub next_sequence: u64,
}

impl QueueState {
    /// Empty queue for `event`.
    #[must_use]
    pub const fn new(event: Event) -> Self {
        Self {
            event,
            entries: Vec::new(),
            tickets: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Availability at `now`.
    #[must_use]
    pub fn availability(&self, now: DateTime<Utc>) -> Availability {
        Availability::compute(&self.event, &self.entries, &self.tickets, now)
    }

    /// The user's non-expired entry, if any.
    #[must_use]
    pub fn active_entry_for(&self, user_id: &UserId) -> Option<&WaitingListEntry> {
        self.entries
            .iter()
            .find(|entry| &entry.user_id == user_id && entry.status.is_active())
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn entry(&self, entry_id: EntryId) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    fn entry_mut(&mut self, entry_id: EntryId) -> Option<&mut WaitingListEntry> {
        self.entries.iter_mut().find(|entry| entry.id == entry_id)
    }

    /// Ids of waiting entries in FIFO order.
    fn waiting_in_order(&self) -> Vec<EntryId> {
        let mut waiting: Vec<&WaitingListEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Waiting)
            .collect();
        waiting.sort_by_key(|entry| entry.sequence);
        waiting.into_iter().map(|entry| entry.id).collect()
    }
}

impl From<QueueSnapshot> for QueueState {
    fn from(snapshot: QueueSnapshot) -> Self {
        let next_sequence = snapshot.next_sequence();
        Self {
            event: snapshot.event,
            entries: snapshot.entries,
            tickets: snapshot.tickets,
            next_sequence,
        }
    }
}

// ============================================================================
// Actions, effects, replies
// ============================================================================

/// Commands accepted by the queue reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueAction {
    /// Add a user to the queue, offering immediately if capacity is free
    Join {
        /// Joining user
        user_id: UserId,
    },
    /// Offer freed capacity to waiting entries in FIFO order
    Promote,
    /// Give up a pending offer
    Release {
        /// Entry holding the offer
        entry_id: EntryId,
    },
    /// Expiry timer callback
    Expire {
        /// Entry the timer guards
        entry_id: EntryId,
    },
    /// Redeem a live offer for a ticket
    ConfirmPurchase {
        /// Entry holding the offer
        entry_id: EntryId,
    },
    /// Stop admitting users to the event
    Cancel,
}

/// What the caller learns about a successful join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    /// Always true: the waiting path is a success too
    pub success: bool,
    /// `offered` or `waiting`
    pub status: EntryStatus,
    /// Human-readable result
    pub message: String,
    /// The created entry
    pub entry: WaitingListEntry,
}

/// Value handed back to the caller of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReply {
    /// Result of [`QueueAction::Join`]
    Joined(JoinOutcome),
    /// Result of [`QueueAction::ConfirmPurchase`]
    Purchased(Ticket),
}

/// Side effects the runtime performs inside the open transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEffect {
    /// Persist a new entry
    InsertEntry(WaitingListEntry),
    /// Persist an entry's new status and expiry
    UpdateEntry(WaitingListEntry),
    /// Persist a new ticket
    IssueTicket(Ticket),
    /// Persist the event row
    UpdateEvent(Event),
    /// Arm a durable expiry timer
    ArmExpiry(ExpiryRequest),
    /// Feed an action back into the reducer within the same transaction
    Dispatch(QueueAction),
    /// Return a value to the caller
    Reply(QueueReply),
}

// ============================================================================
// Reducer
// ============================================================================

/// The waiting-list state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueReducer;

impl QueueReducer {
    /// Creates a new `QueueReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn join(
        state: &mut QueueState,
        user_id: UserId,
        env: &QueueEnvironment,
    ) -> Result<SmallVec<[QueueEffect; 4]>, AdmissionError> {
        let now = env.clock.now();
        if state.event.is_cancelled {
            return Err(AdmissionError::EventCancelled(state.event.id));
        }
        if state.event.has_passed(now) {
            return Err(AdmissionError::EventPassed(state.event.id));
        }
        if state.event.is_owned_by(&user_id) {
            return Err(AdmissionError::OwnEvent {
                event_id: state.event.id,
            });
        }
        if let Some(existing) = state.active_entry_for(&user_id) {
            return Err(AdmissionError::AlreadyQueued {
                event_id: state.event.id,
                user_id,
                existing: existing.id,
            });
        }
        let expires_at = offer_deadline(now, env)?;

        // Capacity freed by offers that lapsed before their timer fired
        // goes to the users already waiting, not to this joiner.
        let mut effects = Self::promote(state, env)?;

        let mut entry = WaitingListEntry {
            id: EntryId::new(),
            event_id: state.event.id,
            user_id,
            status: EntryStatus::Waiting,
            offer_expires_at: None,
            created_at: now,
            sequence: state.next_sequence,
        };

        let message = if state.availability(now).has_capacity() {
            entry.status = EntryStatus::Offered;
            entry.offer_expires_at = Some(expires_at);
            effects.push(QueueEffect::InsertEntry(entry.clone()));
            effects.push(QueueEffect::ArmExpiry(ExpiryRequest {
                entry_id: entry.id,
                event_id: entry.event_id,
                fire_at: expires_at,
            }));
            offer_message(env.offer_window)
        } else {
            effects.push(QueueEffect::InsertEntry(entry.clone()));
            WAITING_MESSAGE.to_string()
        };

        state.next_sequence += 1;
        state.entries.push(entry.clone());
        effects.push(QueueEffect::Reply(QueueReply::Joined(JoinOutcome {
            success: true,
            status: entry.status,
            message,
            entry,
        })));
        Ok(effects)
    }

    fn promote(
        state: &mut QueueState,
        env: &QueueEnvironment,
    ) -> Result<SmallVec<[QueueEffect; 4]>, AdmissionError> {
        if state.event.is_cancelled {
            return Ok(SmallVec::new());
        }

        let now = env.clock.now();
        let remaining = state.availability(now).remaining as usize;
        if remaining == 0 {
            return Ok(SmallVec::new());
        }

        let expires_at = offer_deadline(now, env)?;
        let mut effects = SmallVec::new();
        for entry_id in state.waiting_in_order().into_iter().take(remaining) {
            if let Some(entry) = state.entry_mut(entry_id) {
                entry.status = EntryStatus::Offered;
                entry.offer_expires_at = Some(expires_at);
                effects.push(QueueEffect::UpdateEntry(entry.clone()));
                effects.push(QueueEffect::ArmExpiry(ExpiryRequest {
                    entry_id: entry.id,
                    event_id: entry.event_id,
                    fire_at: expires_at,
                }));
            }
        }
        Ok(effects)
    }

    fn release(
        state: &mut QueueState,
        entry_id: EntryId,
    ) -> Result<SmallVec<[QueueEffect; 4]>, AdmissionError> {
        let entry = state
            .entry_mut(entry_id)
            .ok_or(AdmissionError::NoActiveOffer { entry_id, status: None })?;
        if entry.status != EntryStatus::Offered {
            return Err(AdmissionError::NoActiveOffer {
                entry_id,
                status: Some(entry.status),
            });
        }

        Ok(terminate_offer(entry))
    }

    fn expire(state: &mut QueueState, entry_id: EntryId) -> SmallVec<[QueueEffect; 4]> {
        match state.entry_mut(entry_id) {
            Some(entry) if entry.status == EntryStatus::Offered => terminate_offer(entry),
            _ => SmallVec::new(),
        }
    }

    fn confirm_purchase(
        state: &mut QueueState,
        entry_id: EntryId,
        env: &QueueEnvironment,
    ) -> Result<SmallVec<[QueueEffect; 4]>, AdmissionError> {
        let now = env.clock.now();
        let entry = state
            .entry_mut(entry_id)
            .ok_or(AdmissionError::NoActiveOffer { entry_id, status: None })?;
        if entry.status != EntryStatus::Offered {
            return Err(AdmissionError::NoActiveOffer {
                entry_id,
                status: Some(entry.status),
            });
        }
        if !entry.is_live_offer(now) {
            return Err(AdmissionError::OfferLapsed { entry_id });
        }

        entry.status = EntryStatus::Purchased;
        entry.offer_expires_at = None;
        let updated = entry.clone();

        let ticket = Ticket {
            id: TicketId::new(),
            event_id: updated.event_id,
            user_id: updated.user_id.clone(),
            entry_id,
            status: TicketStatus::Valid,
            issued_at: now,
        };
        state.tickets.push(ticket.clone());

        Ok(smallvec![
            QueueEffect::UpdateEntry(updated),
            QueueEffect::IssueTicket(ticket.clone()),
            QueueEffect::Reply(QueueReply::Purchased(ticket)),
        ])
    }

    fn cancel(state: &mut QueueState) -> SmallVec<[QueueEffect; 4]> {
        if state.event.is_cancelled {
            return SmallVec::new();
        }
        state.event.is_cancelled = true;
        smallvec![QueueEffect::UpdateEvent(state.event.clone())]
    }
}

impl Reducer for QueueReducer {
    type State = QueueState;
    type Action = QueueAction;
    type Effect = QueueEffect;
    type Environment = QueueEnvironment;
    type Error = AdmissionError;

    fn reduce(
        &self,
        state: &mut QueueState,
        action: QueueAction,
        env: &QueueEnvironment,
    ) -> Result<SmallVec<[QueueEffect; 4]>, AdmissionError> {
        match action {
            QueueAction::Join { user_id } => Self::join(state, user_id, env),
            QueueAction::Promote => Self::promote(state, env),
            QueueAction::Release { entry_id } => Self::release(state, entry_id),
            QueueAction::Expire { entry_id } => Ok(Self::expire(state, entry_id)),
            QueueAction::ConfirmPurchase { entry_id } => {
                Self::confirm_purchase(state, entry_id, env)
            }
            QueueAction::Cancel => Ok(Self::cancel(state)),
        }
    }
}

/// Move an offered entry to expired and ask for the freed unit to be re-offered.
fn terminate_offer(entry: &mut WaitingListEntry) -> SmallVec<[QueueEffect; 4]> {
    entry.status = EntryStatus::Expired;
    entry.offer_expires_at = None;
    smallvec![
        QueueEffect::UpdateEntry(entry.clone()),
        QueueEffect::Dispatch(QueueAction::Promote),
    ]
}

/// When an offer made at `now` lapses.
fn offer_deadline(
    now: DateTime<Utc>,
    env: &QueueEnvironment,
) -> Result<DateTime<Utc>, AdmissionError> {
    now.checked_add_signed(env.offer_window)
        .filter(|expires_at| *expires_at > now)
        .ok_or_else(|| {
            AdmissionError::Validation(format!(
                "offer window of {}s is out of range",
                env.offer_window.num_seconds()
            ))
        })
}

/// "Ticket offered. You have N minutes to purchase it."
#[must_use]
pub fn offer_message(window: chrono::Duration) -> String {
    let minutes = window.num_minutes();
    if minutes > 0 {
        format!("Ticket offered. You have {minutes} minutes to purchase it.")
    } else {
        let seconds = window.num_seconds().max(0);
        format!("Ticket offered. You have {seconds} seconds to purchase it.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_message_uses_minutes() {
        assert_eq!(
            offer_message(chrono::Duration::minutes(30)),
            "Ticket offered. You have 30 minutes to purchase it."
        );
        assert_eq!(
            offer_message(chrono::Duration::seconds(45)),
            "Ticket offered. You have 45 seconds to purchase it."
        );
    }
}
