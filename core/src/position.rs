//! Position calculator.
//!
//! A user's rank is recomputed on demand from insertion order:
//!
//! ```text
//! position = 1 + |{ e : e.status ∈ {waiting, offered} ∧ e.sequence < mine.sequence }|
//! ```
//!
//! Only entries still contending for capacity are counted, so a rank drops by
//! exactly the number of earlier entries that terminate.

use crate::types::{UserId, WaitingListEntry};
use serde::{Deserialize, Serialize};

/// A user's active entry and its 1-based rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// The active (non-expired) entry
    pub entry: WaitingListEntry,
    /// 1-based rank among contending entries
    pub position: u32,
}

/// Locate `user_id`'s active entry among one event's `entries`.
///
/// Returns `None` if the user has no non-expired entry.
#[must_use]
pub fn locate(entries: &[WaitingListEntry], user_id: &UserId) -> Option<QueuePosition> {
    let entry = entries
        .iter()
        .find(|entry| &entry.user_id == user_id && entry.status.is_active())?;

    Some(QueuePosition {
        entry: entry.clone(),
        position: rank(entries, entry),
    })
}

/// Rank of `entry` among `entries`.
#[must_use]
pub fn rank(entries: &[WaitingListEntry], entry: &WaitingListEntry) -> u32 {
    let ahead = entries
        .iter()
        .filter(|other| {
            other.event_id == entry.event_id
                && other.status.is_contending()
                && other.sequence < entry.sequence
        })
        .count();
    u32::try_from(ahead).map_or(u32::MAX, |ahead| ahead.saturating_add(1))
}
