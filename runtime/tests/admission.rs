//! End-to-end admission scenarios against the in-memory store.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;
use waitline_core::{
    AdmissionConfig, AdmissionError, Clock, EntryId, EntryStatus, ErrorKind, EventId, NewEvent,
    StoreError, Ticket, TicketId, TicketStatus, UserId,
};
use waitline_runtime::{
    AdmissionService, ExpiryWorker, RetryPolicy, SlidingWindowRateLimiter, WorkerConfig,
};
use waitline_testing::{InMemoryQueueStore, ManualClock, init_test_tracing};

struct Harness {
    store: InMemoryQueueStore,
    clock: ManualClock,
    service: AdmissionService,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AdmissionConfig::default())
    }

    fn with_config(config: AdmissionConfig) -> Self {
        init_test_tracing();
        let store = InMemoryQueueStore::new();
        let clock = ManualClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let limiter = Arc::new(SlidingWindowRateLimiter::new(shared_clock.clone()));
        let service = AdmissionService::new(Arc::new(store.clone()), limiter, shared_clock, config)
            .with_retry_policy(
                RetryPolicy::new(5)
                    .with_initial_delay(Duration::from_millis(1))
                    .with_max_delay(Duration::from_millis(5)),
            );
        Self {
            store,
            clock,
            service,
        }
    }

    fn worker(&self) -> ExpiryWorker {
        ExpiryWorker::new(
            self.service.clone(),
            Arc::new(self.store.clone()),
            WorkerConfig::default(),
        )
    }

    async fn event(&self, capacity: u32) -> EventId {
        self.service
            .create_event("Spring Concert", capacity)
            .await
            .expect("event should be created")
            .id
    }

    async fn position_of(&self, event_id: EventId, user: &str) -> Option<u32> {
        self.service
            .position(event_id, &UserId::new(user))
            .await
            .unwrap()
            .map(|p| p.position)
    }
}

#[tokio::test]
async fn test_offer_lapses_and_passes_to_next_in_line() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    assert!(alice.success);
    assert_eq!(alice.status, EntryStatus::Offered);
    assert_eq!(
        alice.message,
        "Ticket offered. You have 30 minutes to purchase it."
    );

    let bob = h.service.join(event_id, UserId::new("bob")).await.unwrap();
    assert!(bob.success);
    assert_eq!(bob.status, EntryStatus::Waiting);
    assert_eq!(h.position_of(event_id, "bob").await, Some(2));

    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.live_offers, 1);
    assert_eq!(availability.remaining, 0);

    h.clock.advance(chrono::Duration::minutes(31));
    h.worker().tick().await.unwrap();

    let alice = h.store.entry(alice.entry.id).await.unwrap();
    assert_eq!(alice.status, EntryStatus::Expired);
    assert_eq!(alice.offer_expires_at, None);

    let bob = h.store.entry(bob.entry.id).await.unwrap();
    assert_eq!(bob.status, EntryStatus::Offered);
    assert_eq!(
        bob.offer_expires_at,
        Some(h.clock.now() + chrono::Duration::minutes(30))
    );
    assert_eq!(h.position_of(event_id, "bob").await, Some(1));
    assert_eq!(h.position_of(event_id, "alice").await, None);
}

#[tokio::test]
async fn test_lapsed_offer_goes_to_waiter_before_new_joiner() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    h.service.join(event_id, UserId::new("alice")).await.unwrap();
    let bob = h.service.join(event_id, UserId::new("bob")).await.unwrap();

    // Alice's offer lapses but no worker has fired her timer yet
    h.clock.advance(chrono::Duration::minutes(31));

    let carol = h.service.join(event_id, UserId::new("carol")).await.unwrap();
    assert_eq!(carol.status, EntryStatus::Waiting);

    let bob = h.store.entry(bob.entry.id).await.unwrap();
    assert_eq!(bob.status, EntryStatus::Offered);
    assert_eq!(h.position_of(event_id, "bob").await, Some(1));
    assert_eq!(h.position_of(event_id, "carol").await, Some(2));

    // The late timer expires Alice and finds nothing left to promote
    assert_eq!(h.worker().tick().await.unwrap(), 1);
    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.live_offers, 1);
    assert_eq!(h.position_of(event_id, "carol").await, Some(2));
}

#[tokio::test]
async fn test_oversized_offer_window_is_capped() {
    let h = Harness::with_config(AdmissionConfig {
        offer_window_secs: u64::MAX,
        ..AdmissionConfig::default()
    });
    let event_id = h.event(1).await;

    let mut offered = 0;
    for user in ["alice", "bob", "carol", "dave"] {
        let outcome = h.service.join(event_id, UserId::new(user)).await.unwrap();
        if outcome.status == EntryStatus::Offered {
            offered += 1;
            assert_eq!(
                outcome.entry.offer_expires_at,
                Some(h.clock.now() + chrono::Duration::days(7))
            );
            assert_eq!(
                outcome.message,
                "Ticket offered. You have 10080 minutes to purchase it."
            );
        }
    }
    assert_eq!(offered, 1);
}

#[tokio::test]
async fn test_tickets_sold_outside_the_queue_hold_capacity() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let ticket = |user: &str, status: TicketStatus| Ticket {
        id: TicketId::new(),
        event_id,
        user_id: UserId::new(user),
        entry_id: EntryId::new(),
        status,
        issued_at: h.clock.now(),
    };
    h.store.put_ticket(ticket("walk-in", TicketStatus::Valid)).await;
    h.store.put_ticket(ticket("refunded", TicketStatus::Refunded)).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    assert_eq!(alice.status, EntryStatus::Offered);
    let bob = h.service.join(event_id, UserId::new("bob")).await.unwrap();
    assert_eq!(bob.status, EntryStatus::Waiting);

    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.committed, 1);
    assert!(availability.sold_out);

    let walk_in = h
        .service
        .ticket_for(event_id, &UserId::new("walk-in"))
        .await
        .unwrap()
        .expect("walk-in ticket");
    assert_eq!(walk_in.status, TicketStatus::Valid);
}

#[tokio::test]
async fn test_waiting_entries_are_promoted_in_join_order() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let first = h.service.join(event_id, UserId::new("first")).await.unwrap();
    let mut waiting = Vec::new();
    for user in ["u1", "u2", "u3"] {
        waiting.push(h.service.join(event_id, UserId::new(user)).await.unwrap());
    }

    h.service.release(event_id, first.entry.id).await.unwrap();

    let statuses: Vec<EntryStatus> = {
        let mut out = Vec::new();
        for outcome in &waiting {
            out.push(h.store.entry(outcome.entry.id).await.unwrap().status);
        }
        out
    };
    assert_eq!(
        statuses,
        vec![EntryStatus::Offered, EntryStatus::Waiting, EntryStatus::Waiting]
    );
    assert_eq!(h.position_of(event_id, "u3").await, Some(3));
}

#[tokio::test]
async fn test_release_frees_capacity_when_nobody_waits() {
    let h = Harness::new();
    let event_id = h.event(2).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    assert_eq!(h.service.availability(event_id).await.unwrap().remaining, 1);

    h.service.release(event_id, alice.entry.id).await.unwrap();
    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.remaining, 2);
    assert!(!availability.sold_out);

    // A second release finds no offer
    let err = h.service.release(event_id, alice.entry.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_repeated_expiry_is_a_noop() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    let bob = h.service.join(event_id, UserId::new("bob")).await.unwrap();

    h.service.expire(alice.entry.id, event_id).await.unwrap();
    let after_first = h.store.entries(event_id).await;

    h.service.expire(alice.entry.id, event_id).await.unwrap();
    assert_eq!(h.store.entries(event_id).await, after_first);

    let bob = h.store.entry(bob.entry.id).await.unwrap();
    assert_eq!(bob.status, EntryStatus::Offered);
}

#[tokio::test]
async fn test_expiry_for_unknown_event_is_ignored() {
    let h = Harness::new();
    let result = h
        .service
        .expire(waitline_core::EntryId::new(), EventId::new())
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_purchase_issues_ticket_and_holds_capacity() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    let ticket = h
        .service
        .confirm_purchase(event_id, alice.entry.id)
        .await
        .unwrap();
    assert_eq!(ticket.user_id, UserId::new("alice"));
    assert_eq!(ticket.entry_id, alice.entry.id);

    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.committed, 1);
    assert!(availability.sold_out);

    // Purchased users keep their entry and cannot queue again
    let err = h.service.join(event_id, UserId::new("alice")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::AlreadyQueued { .. }));
}

#[tokio::test]
async fn test_purchase_after_window_is_rejected() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(30));

    let err = h
        .service
        .confirm_purchase(event_id, alice.entry.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::OfferLapsed { .. }));
    assert!(h.store.tickets(event_id).await.is_empty());
}

#[tokio::test]
async fn test_duplicate_join_conflicts_until_entry_expires() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    let err = h.service.join(event_id, UserId::new("alice")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    h.service.release(event_id, alice.entry.id).await.unwrap();
    let again = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    assert_eq!(again.status, EntryStatus::Offered);
    assert_ne!(again.entry.id, alice.entry.id);
}

#[tokio::test]
async fn test_cancelled_event_rejects_joins() {
    let h = Harness::new();
    let event_id = h.event(5).await;

    let event = h.service.cancel_event(event_id).await.unwrap();
    assert!(event.is_cancelled);
    assert!(h.service.list_events().await.unwrap().is_empty());

    let err = h.service.join(event_id, UserId::new("alice")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::EventCancelled(_)));
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let h = Harness::new();
    let missing = EventId::new();

    let err = h.service.join(missing, UserId::new("alice")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        h.service.availability(missing).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        h.service
            .position(missing, &UserId::new("alice"))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_invalid_event_input_is_rejected() {
    let h = Harness::new();
    for (name, capacity) in [("", 10), ("   ", 10), ("Gig", 0)] {
        let err = h.service.create_event(name, capacity).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    for draft in [
        NewEvent::new("Gig", 10).owned_by(UserId::new(" ")),
        NewEvent::new("Gig", 10).starting_at(h.clock.now()),
        NewEvent::new("Gig", 10).starting_at(h.clock.now() - chrono::Duration::days(1)),
    ] {
        let err = h.service.create_event_with(draft).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert!(h.service.list_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_joins_stop_when_the_event_starts() {
    let h = Harness::new();
    let event = h
        .service
        .create_event_with(
            NewEvent::new("Spring Concert", 5)
                .owned_by(UserId::new("organizer"))
                .starting_at(h.clock.now() + chrono::Duration::hours(1)),
        )
        .await
        .unwrap();
    assert_eq!(event.owner_id, Some(UserId::new("organizer")));

    let err = h
        .service
        .join(event.id, UserId::new("organizer"))
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::OwnEvent { .. }));

    h.service.join(event.id, UserId::new("alice")).await.unwrap();

    h.clock.advance(chrono::Duration::hours(1));
    let err = h.service.join(event.id, UserId::new("bob")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::EventPassed(_)));
    assert_eq!(h.position_of(event.id, "bob").await, None);
}

#[tokio::test]
async fn test_join_rate_limit_throttles_user() {
    let h = Harness::with_config(AdmissionConfig {
        join_limit: 2,
        ..AdmissionConfig::default()
    });
    let event_id = h.event(10).await;

    h.service.join(event_id, UserId::new("alice")).await.unwrap();
    // Conflicting attempt still counts against the window
    h.service.join(event_id, UserId::new("alice")).await.unwrap_err();

    let err = h.service.join(event_id, UserId::new("alice")).await.unwrap_err();
    match err {
        AdmissionError::Throttled { retry_after } => {
            assert_eq!(retry_after, Duration::from_secs(30 * 60));
        }
        other => panic!("expected Throttled, got {other:?}"),
    }
    assert_eq!(err_kind_of_other_user(&h, event_id).await, None);
}

async fn err_kind_of_other_user(h: &Harness, event_id: EventId) -> Option<ErrorKind> {
    h.service
        .join(event_id, UserId::new("bob"))
        .await
        .err()
        .map(|e| e.kind())
}

#[tokio::test]
async fn test_disabled_rate_limit_never_throttles() {
    let h = Harness::with_config(AdmissionConfig {
        join_limit: 0,
        ..AdmissionConfig::default()
    });
    let event_id = h.event(1).await;

    h.service.join(event_id, UserId::new("alice")).await.unwrap();
    for _ in 0..10 {
        let err = h.service.join(event_id, UserId::new("alice")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}

#[tokio::test]
async fn test_transient_conflicts_are_retried() {
    let h = Harness::new();
    let event_id = h.event(1).await;

    h.store.inject_conflicts(2);
    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    assert_eq!(alice.status, EntryStatus::Offered);

    // Failed attempts left nothing behind
    assert_eq!(h.store.entries(event_id).await.len(), 1);
    assert_eq!(h.store.timers().await.len(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_store_error() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let service = h.service.clone().with_retry_policy(RetryPolicy::none());

    h.store.inject_conflicts(1);
    let err = service.join(event_id, UserId::new("alice")).await.unwrap_err();
    assert!(matches!(err, AdmissionError::Store(StoreError::Conflict(_))));
    assert!(err.is_retryable());
    assert!(h.store.entries(event_id).await.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_oversell() {
    let h = Harness::new();
    let event_id = h.event(3).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.join(event_id, UserId::new(format!("user-{i}"))).await
        }));
    }

    let mut offered = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.status == EntryStatus::Offered {
            offered += 1;
        }
    }
    assert_eq!(offered, 3);

    let entries = h.store.entries(event_id).await;
    assert_eq!(entries.len(), 20);
    let mut sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());

    let availability = h.service.availability(event_id).await.unwrap();
    assert_eq!(availability.live_offers, 3);
    assert_eq!(availability.remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_joins_create_one_entry() {
    let h = Harness::with_config(AdmissionConfig {
        join_limit: 0,
        ..AdmissionConfig::default()
    });
    let event_id = h.event(5).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service.join(event_id, UserId::new("alice")).await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(h.store.entries(event_id).await.len(), 1);
}

#[tokio::test]
async fn test_worker_redelivers_until_expiry_commits() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();

    let worker = ExpiryWorker::new(
        h.service.clone().with_retry_policy(RetryPolicy::none()),
        Arc::new(h.store.clone()),
        WorkerConfig {
            lease_secs: 10,
            ..WorkerConfig::default()
        },
    );

    h.clock.advance(chrono::Duration::minutes(31));
    h.store.inject_conflicts(1);
    assert_eq!(worker.tick().await.unwrap(), 1);
    assert_eq!(
        h.store.entry(alice.entry.id).await.unwrap().status,
        EntryStatus::Offered
    );

    // Still leased
    assert_eq!(worker.tick().await.unwrap(), 0);

    h.clock.advance(chrono::Duration::seconds(11));
    assert_eq!(worker.tick().await.unwrap(), 1);
    assert_eq!(
        h.store.entry(alice.entry.id).await.unwrap().status,
        EntryStatus::Expired
    );
    assert!(h.store.timers().await.is_empty());
}

#[tokio::test]
async fn test_worker_run_fires_due_timers() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let alice = h.service.join(event_id, UserId::new("alice")).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(31));

    let worker = ExpiryWorker::new(
        h.service.clone(),
        Arc::new(h.store.clone()),
        WorkerConfig {
            poll_interval_ms: 10,
            ..WorkerConfig::default()
        },
    );
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = tokio::spawn(worker.run(shutdown_rx));

    let mut expired = false;
    for _ in 0..200 {
        if h.store.entry(alice.entry.id).await.unwrap().status == EntryStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(expired);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
