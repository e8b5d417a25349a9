//! `PostgreSQL` store for the Waitline admission controller.
//!
//! This crate implements the `QueueStore` and `TimerQueue` traits from
//! `waitline-core` on top of sqlx:
//!
//! - Per-event transactions serialized by a row lock on the event
//! - At most one active entry per (event, user), backed by a partial unique index
//! - Durable expiry timers leased with `FOR UPDATE SKIP LOCKED`
//! - Embedded migrations
//!
//! Serialization failures, deadlocks and unique violations surface as the
//! retryable `StoreError::Conflict`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use waitline_postgres::PostgresQueueStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresQueueStore::connect("postgres://localhost/waitline").await?;
//!     store.migrate().await?;
//!     let store = Arc::new(store);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;
mod timers;

pub use store::{PoolSettings, PostgresQueueStore};
