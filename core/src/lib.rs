//! # Waitline Core
//!
//! Domain types and the pure admission logic for a ticket waiting list.
//!
//! For an event with fixed capacity, users join a waiting list. Free capacity
//! is turned into time-limited purchase offers; offers that lapse or are
//! released go back to the next user in line.
//!
//! ## Core Concepts
//!
//! - **Ledger**: [`Availability::compute`] recounts committed capacity from
//!   records on every call
//! - **Reducer**: [`QueueReducer`] is the per-event state machine
//!   `(QueueState, QueueAction, QueueEnvironment) → QueueEffect*`
//! - **Effect**: row writes, durable expiry timers and follow-up actions,
//!   described as values and executed by the runtime
//! - **Store**: [`QueueStore`] and [`TimerQueue`] abstract the transactional
//!   database and the delayed-job queue
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Per-event serialization, never a global lock
//! - No cached counters
//!
//! ## Example
//!
//! ```ignore
//! use waitline_core::*;
//!
//! let mut state = QueueState::new(Event::new("Concert", Capacity::new(1), now));
//! let effects = QueueReducer.reduce(
//!     &mut state,
//!     QueueAction::Join { user_id: UserId::new("alice") },
//!     &env,
//! )?;
//! ```

pub mod config;
pub mod environment;
pub mod error;
pub mod ledger;
pub mod position;
pub mod queue;
pub mod rate_limit;
pub mod reducer;
pub mod store;
pub mod types;

pub use config::AdmissionConfig;
pub use environment::{Clock, QueueEnvironment, SystemClock};
pub use error::{AdmissionError, ErrorKind, Result, StoreError};
pub use ledger::Availability;
pub use position::QueuePosition;
pub use queue::{JoinOutcome, QueueAction, QueueEffect, QueueReducer, QueueReply, QueueState};
pub use rate_limit::RateLimiter;
pub use reducer::Reducer;
pub use store::{EventTransaction, ExpiryRequest, ExpiryTimer, QueueSnapshot, QueueStore, TimerQueue};
pub use types::{
    Capacity, EntryId, EntryStatus, Event, EventId, NewEvent, Ticket, TicketId, TicketStatus,
    TimerId, UserId, WaitingListEntry,
};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};
