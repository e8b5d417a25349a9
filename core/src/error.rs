//! Error types for admission operations.
//!
//! Every failure the core can produce is a typed variant with a coarse
//! [`ErrorKind`], so the calling layer can decide between retrying and
//! showing a message without inspecting strings.

use crate::types::{EntryId, EntryStatus, EventId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for admission operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Errors raised by a [`QueueStore`](crate::store::QueueStore) or
/// [`TimerQueue`](crate::store::TimerQueue) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent transaction on the same event won; the whole operation
    /// can be re-run from the start.
    #[error("Transaction conflict: {0}")]
    Conflict(String),

    /// Database query failed.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether re-running the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Unavailable(_))
    }
}

/// Coarse classification of an [`AdmissionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Referenced event or entry does not exist.
    NotFound,
    /// Duplicate active join.
    Conflict,
    /// Too many joins by the same identity.
    Throttled,
    /// Entry or event is in the wrong lifecycle state.
    InvalidState,
    /// Malformed input.
    Validation,
    /// Persistence failure.
    Store,
}

/// Comprehensive error taxonomy for the admission controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The event does not exist.
    #[error("Event {0} not found")]
    EventNotFound(EventId),

    /// The user already holds a non-expired entry for this event.
    #[error("Already on the waiting list")]
    AlreadyQueued {
        /// Event the user tried to join
        event_id: EventId,
        /// User who tried to join
        user_id: UserId,
        /// The entry that is still active
        existing: EntryId,
    },

    /// The user joined too often within the rate-limit window.
    #[error("You have joined the waiting list too many times. Please wait before trying again.")]
    Throttled {
        /// How long until another join is accepted
        retry_after: Duration,
    },

    /// Release or purchase was attempted on an entry without a pending offer.
    #[error("No valid ticket offer found")]
    NoActiveOffer {
        /// The entry that was referenced
        entry_id: EntryId,
        /// Its current status, or `None` if it does not exist
        status: Option<EntryStatus>,
    },

    /// The offer is still marked offered but its window has already passed.
    #[error("Ticket offer for entry {entry_id} has expired")]
    OfferLapsed {
        /// The entry whose offer lapsed
        entry_id: EntryId,
    },

    /// The event was cancelled and no longer admits anyone.
    #[error("Event {0} has been cancelled")]
    EventCancelled(EventId),

    /// The event has already started.
    #[error("This event has already passed")]
    EventPassed(EventId),

    /// The organizer tried to queue for their own event.
    #[error("You cannot buy a ticket for your own event")]
    OwnEvent {
        /// The organizer's event
        event_id: EventId,
    },

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdmissionError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::EventNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyQueued { .. } => ErrorKind::Conflict,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::NoActiveOffer { .. }
            | Self::OfferLapsed { .. }
            | Self::EventCancelled(_)
            | Self::EventPassed(_)
            | Self::OwnEvent { .. } => ErrorKind::InvalidState,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Store(_) => ErrorKind::Store,
        }
    }

    /// Whether re-running the whole operation may succeed.
    ///
    /// Only transient store failures qualify; every other kind is a decision
    /// the caller has to surface.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}
