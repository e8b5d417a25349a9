//! Capacity ledger.
//!
//! The single routine that decides how much of an event's inventory is
//! committed. Join, promotion, purchase and the read endpoint all call
//! [`Availability::compute`]; nothing keeps a running counter, because offer
//! liveness depends on each entry's own expiry relative to "now".
//!
//! ```text
//! committed   = tickets with status ∈ {valid, used}
//! live_offers = entries with status = offered AND offer_expires_at > now
//! remaining   = max(0, total_capacity − (committed + live_offers))
//! ```

use crate::types::{Event, Ticket, WaitingListEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capacity accounting for one event at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// Configured inventory units
    pub total_capacity: u32,
    /// Sold tickets still holding capacity
    pub committed: u32,
    /// Offers that have not lapsed
    pub live_offers: u32,
    /// Units that can be offered right now
    pub remaining: u32,
    /// Whether nothing can be offered
    pub sold_out: bool,
}

impl Availability {
    /// Compute availability for `event` from its raw records.
    ///
    /// Records belonging to other events are ignored.
    #[must_use]
    pub fn compute<'a, E, T>(event: &Event, entries: E, tickets: T, now: DateTime<Utc>) -> Self
    where
        E: IntoIterator<Item = &'a WaitingListEntry>,
        T: IntoIterator<Item = &'a Ticket>,
    {
        let committed = tickets
            .into_iter()
            .filter(|ticket| ticket.event_id == event.id && ticket.status.holds_capacity())
            .count();
        let live_offers = entries
            .into_iter()
            .filter(|entry| entry.event_id == event.id && entry.is_live_offer(now))
            .count();

        Self::from_counts(
            event.total_capacity.value(),
            u32::try_from(committed).unwrap_or(u32::MAX),
            u32::try_from(live_offers).unwrap_or(u32::MAX),
        )
    }

    /// Build availability from pre-counted totals.
    #[must_use]
    pub const fn from_counts(total_capacity: u32, committed: u32, live_offers: u32) -> Self {
        let used = committed.saturating_add(live_offers);
        Self {
            total_capacity,
            committed,
            live_offers,
            remaining: total_capacity.saturating_sub(used),
            sold_out: used >= total_capacity,
        }
    }

    /// Committed sales plus live offers.
    #[must_use]
    pub const fn capacity_used(&self) -> u32 {
        self.committed.saturating_add(self.live_offers)
    }

    /// Whether at least one unit can be offered.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.remaining > 0
    }
}
