//! Domain types for the Waitline admission controller.
//!
//! Identifiers, the `Event` being sold, waiting-list entries with their
//! lifecycle status, and the tickets issued when an offer is redeemed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a waiting-list entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random `EntryId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EntryId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an armed expiry timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(Uuid);

impl TimerId {
    /// Creates a new random `TimerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TimerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a user, as issued by the external identity provider.
///
/// Opaque to the core: it is only compared for equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Creates a new `UserId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Total inventory units an event can sell
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event
// ============================================================================

/// An event with a fixed number of tickets.
///
/// Capacity never changes after creation; only the cancellation flag does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub id: EventId,
    /// Display name
    pub name: String,
    /// Total inventory units
    pub total_capacity: Capacity,
    /// Whether the organizer cancelled the event
    pub is_cancelled: bool,
    /// When the event was created
    pub created_at: DateTime<Utc>,
    /// Organizer, who may not queue for their own event
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// When the event takes place; joins are refused from then on
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Creates a new, non-cancelled event without owner or start time
    #[must_use]
    pub fn new(name: impl Into<String>, total_capacity: Capacity, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            total_capacity,
            is_cancelled: false,
            created_at,
            owner_id: None,
            starts_at: None,
        }
    }

    /// Sets the organizer
    #[must_use]
    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Sets the start time
    #[must_use]
    pub fn with_start(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }

    /// Whether the event has started at `now`.
    #[must_use]
    pub fn has_passed(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.is_some_and(|starts_at| starts_at <= now)
    }

    /// Whether `user_id` organizes this event.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.owner_id.as_ref() == Some(user_id)
    }
}

/// Caller-supplied fields of an event about to be created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Display name
    pub name: String,
    /// Total inventory units
    pub total_capacity: u32,
    /// Organizer, if any
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Start time, if any
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}

impl NewEvent {
    /// An event with neither owner nor start time
    #[must_use]
    pub fn new(name: impl Into<String>, total_capacity: u32) -> Self {
        Self {
            name: name.into(),
            total_capacity,
            owner_id: None,
            starts_at: None,
        }
    }

    /// Sets the organizer
    #[must_use]
    pub fn owned_by(mut self, owner_id: UserId) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    /// Sets the start time
    #[must_use]
    pub fn starting_at(mut self, starts_at: DateTime<Utc>) -> Self {
        self.starts_at = Some(starts_at);
        self
    }
}

// ============================================================================
// Waiting List
// ============================================================================

/// Lifecycle status of a waiting-list entry.
///
/// ```text
/// waiting ──promote──▶ offered ──purchase──▶ purchased
///                         │
///                         └──expire/release──▶ expired
/// ```
///
/// `Purchased` and `Expired` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Queued, no capacity held
    Waiting,
    /// Holding one unit of capacity until the offer expires
    Offered,
    /// Offer redeemed; a ticket exists
    Purchased,
    /// Offer lapsed or was released
    Expired,
}

impl EntryStatus {
    /// Convert status to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Offered => "offered",
            Self::Purchased => "purchased",
            Self::Expired => "expired",
        }
    }

    /// Parse status from its storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "offered" => Some(Self::Offered),
            "purchased" => Some(Self::Purchased),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether the entry still blocks its user from joining again.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Expired)
    }

    /// Whether the entry still contends for capacity.
    #[must_use]
    pub const fn is_contending(&self) -> bool {
        matches!(self, Self::Waiting | Self::Offered)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's place in an event's waiting list.
///
/// Entries are never deleted: terminated entries stay as history and every
/// calculation filters on `status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingListEntry {
    /// Unique entry identifier
    pub id: EntryId,
    /// Event this entry queues for
    pub event_id: EventId,
    /// Queued user
    pub user_id: UserId,
    /// Lifecycle status
    pub status: EntryStatus,
    /// When the current offer lapses (only set while `Offered`)
    pub offer_expires_at: Option<DateTime<Utc>>,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// Per-event insertion order, strictly increasing (FIFO key)
    pub sequence: u64,
}

impl WaitingListEntry {
    /// Whether this entry is an offer that has not yet lapsed at `now`.
    ///
    /// An offer whose expiry instant equals `now` is no longer live.
    #[must_use]
    pub fn is_live_offer(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Offered
            && self.offer_expires_at.is_some_and(|expires_at| expires_at > now)
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Ticket status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Paid and unused
    Valid,
    /// Scanned at the door
    Used,
    /// Money returned
    Refunded,
    /// Voided
    Cancelled,
}

impl TicketStatus {
    /// Convert status to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Refunded => "refunded",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            "refunded" => Some(Self::Refunded),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether a ticket in this status counts as sold inventory.
    #[must_use]
    pub const fn holds_capacity(&self) -> bool {
        matches!(self, Self::Valid | Self::Used)
    }
}

/// A sold ticket
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier
    pub id: TicketId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Ticket holder
    pub user_id: UserId,
    /// Waiting-list entry whose offer was redeemed
    pub entry_id: EntryId,
    /// Ticket status
    pub status: TicketStatus,
    /// When the ticket was issued
    pub issued_at: DateTime<Utc>,
}
