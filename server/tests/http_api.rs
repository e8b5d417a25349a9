//! HTTP API tests over the in-memory store.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use waitline_core::{AdmissionConfig, Clock};
use waitline_runtime::{AdmissionService, ReadinessProbe, SlidingWindowRateLimiter};
use waitline_server::{AppState, CORRELATION_ID_HEADER, build_router};
use waitline_testing::{InMemoryQueueStore, ManualClock, init_test_tracing};

fn app_with(config: AdmissionConfig) -> (Router, ManualClock) {
    init_test_tracing();
    let store = InMemoryQueueStore::new();
    let clock = ManualClock::default();
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let service = AdmissionService::new(
        Arc::new(store.clone()),
        Arc::new(SlidingWindowRateLimiter::new(shared_clock.clone())),
        shared_clock,
        config,
    );
    let readiness = ReadinessProbe::new(Arc::new(store.clone()), Arc::new(store), 100);
    (build_router(AppState::new(service, readiness)), clock)
}

fn app() -> Router {
    app_with(AdmissionConfig::default()).0
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("response body should be JSON")
}

async fn create_event(app: &Router, capacity: u32) -> String {
    let response = send(
        app,
        Method::POST,
        "/api/events",
        Some(json!({"name": "Spring Concert", "total_capacity": capacity})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["id"]
        .as_str()
        .expect("event id")
        .to_string()
}

async fn join(app: &Router, event_id: &str, user: &str) -> Response {
    send(
        app,
        Method::POST,
        &format!("/api/events/{event_id}/queue"),
        Some(json!({"user_id": user})),
    )
    .await
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app();

    let response = send(&app, Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    assert_eq!(json_body(response).await["status"], "ok");

    let response = send(&app, Method::GET, "/ready", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_list_and_get_event() {
    let app = app();
    let event_id = create_event(&app, 5).await;

    let response = send(&app, Method::GET, "/api/events", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 1);

    let response = send(&app, Method::GET, &format!("/api/events/{event_id}"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["name"], "Spring Concert");
    assert_eq!(body["total_capacity"], 5);
    assert_eq!(body["is_cancelled"], false);
}

#[tokio::test]
async fn test_zero_capacity_is_bad_request() {
    let app = app();
    let response = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"name": "Empty", "total_capacity": 0})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_event_is_not_found() {
    let app = app();
    let missing = uuid::Uuid::new_v4();

    let response = send(&app, Method::GET, &format!("/api/events/{missing}"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = join(&app, &missing.to_string(), "alice").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_join_offers_then_queues() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    let response = join(&app, &event_id, "alice").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let alice = json_body(response).await;
    assert_eq!(alice["success"], true);
    assert_eq!(alice["status"], "offered");
    assert_eq!(
        alice["message"],
        "Ticket offered. You have 30 minutes to purchase it."
    );
    assert!(alice["offer_expires_at"].is_string());

    let response = join(&app, &event_id, "bob").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let bob = json_body(response).await;
    assert_eq!(bob["status"], "waiting");
    assert!(bob["offer_expires_at"].is_null());

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/queue/bob"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let position = json_body(response).await;
    assert_eq!(position["position"], 2);
    assert_eq!(position["entry_id"], bob["entry_id"]);

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/availability"),
        None,
    )
    .await;
    let availability = json_body(response).await;
    assert_eq!(availability["live_offers"], 1);
    assert_eq!(availability["remaining"], 0);
    assert_eq!(availability["sold_out"], true);
}

#[tokio::test]
async fn test_position_without_entry_is_not_found() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/queue/nobody"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_join_is_conflict() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    assert_eq!(join(&app, &event_id, "alice").await.status(), StatusCode::CREATED);
    let response = join(&app, &event_id, "alice").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["code"], "ALREADY_QUEUED");
    assert_eq!(body["message"], "Already on the waiting list");
}

#[tokio::test]
async fn test_release_promotes_next_and_purchase_issues_ticket() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    let alice = json_body(join(&app, &event_id, "alice").await).await;
    let bob = json_body(join(&app, &event_id, "bob").await).await;
    let alice_entry = alice["entry_id"].as_str().unwrap();
    let bob_entry = bob["entry_id"].as_str().unwrap();

    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/entries/{alice_entry}/release"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Releasing again finds no offer
    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/entries/{alice_entry}/release"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["message"],
        "No valid ticket offer found"
    );

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/queue/bob"),
        None,
    )
    .await;
    let position = json_body(response).await;
    assert_eq!(position["status"], "offered");
    assert_eq!(position["position"], 1);

    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/entries/{bob_entry}/purchase"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ticket = json_body(response).await;
    assert_eq!(ticket["user_id"], "bob");
    assert_eq!(ticket["status"], "valid");
    assert_eq!(ticket["entry_id"], bob["entry_id"]);
}

#[tokio::test]
async fn test_purchase_after_offer_lapses_is_rejected() {
    let (app, clock) = app_with(AdmissionConfig::default());
    let event_id = create_event(&app, 1).await;

    let alice = json_body(join(&app, &event_id, "alice").await).await;
    let entry_id = alice["entry_id"].as_str().unwrap();

    clock.advance(chrono::Duration::minutes(31));

    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/entries/{entry_id}/purchase"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_cancelled_event_rejects_joins() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/cancel"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["is_cancelled"], true);

    let response = join(&app, &event_id, "alice").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["code"], "EVENT_CANCELLED");

    let response = send(&app, Method::GET, "/api/events", None).await;
    assert!(json_body(response).await["events"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_throttled_join_sets_retry_after() {
    let (app, _clock) = app_with(AdmissionConfig {
        join_limit: 1,
        ..AdmissionConfig::default()
    });
    let event_id = create_event(&app, 1).await;

    assert_eq!(join(&app, &event_id, "alice").await.status(), StatusCode::CREATED);

    let response = join(&app, &event_id, "alice").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(retry_after, 1800);
    assert_eq!(json_body(response).await["code"], "THROTTLED");
}

#[tokio::test]
async fn test_owner_cannot_join_own_event() {
    let app = app();
    let response = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"name": "Spring Concert", "total_capacity": 2, "owner_id": "organizer"})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let event = json_body(response).await;
    assert_eq!(event["owner_id"], "organizer");
    let event_id = event["id"].as_str().unwrap();

    let response = join(&app, event_id, "organizer").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["code"], "OWN_EVENT");
    assert_eq!(body["message"], "You cannot buy a ticket for your own event");

    assert_eq!(join(&app, event_id, "alice").await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_join_after_event_started_is_rejected() {
    let (app, clock) = app_with(AdmissionConfig::default());
    let starts_at = clock.now() + chrono::Duration::hours(1);
    let response = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"name": "Spring Concert", "total_capacity": 2, "starts_at": starts_at})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let event_id = json_body(response).await["id"].as_str().unwrap().to_string();

    assert_eq!(join(&app, &event_id, "alice").await.status(), StatusCode::CREATED);

    clock.advance(chrono::Duration::hours(2));
    let response = join(&app, &event_id, "bob").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["code"], "EVENT_PASSED");
    assert_eq!(body["message"], "This event has already passed");
}

#[tokio::test]
async fn test_event_starting_in_the_past_is_bad_request() {
    let (app, clock) = app_with(AdmissionConfig::default());
    let starts_at = clock.now() - chrono::Duration::minutes(1);
    let response = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"name": "Spring Concert", "total_capacity": 2, "starts_at": starts_at})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ticket_lookup_by_user() {
    let app = app();
    let event_id = create_event(&app, 1).await;

    let alice = json_body(join(&app, &event_id, "alice").await).await;
    let entry_id = alice["entry_id"].as_str().unwrap();

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/tickets/alice"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app,
        Method::POST,
        &format!("/api/events/{event_id}/entries/{entry_id}/purchase"),
        None,
    )
    .await;
    let purchased = json_body(response).await;

    let response = send(
        &app,
        Method::GET,
        &format!("/api/events/{event_id}/tickets/alice"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let ticket = json_body(response).await;
    assert_eq!(ticket["id"], purchased["id"]);
    assert_eq!(ticket["user_id"], "alice");
    assert_eq!(ticket["status"], "valid");
}

#[tokio::test]
async fn test_correlation_id_is_echoed() {
    let app = app();
    let id = uuid::Uuid::new_v4().to_string();
    let request = Request::builder()
        .uri("/api/events")
        .header(CORRELATION_ID_HEADER, &id)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap(),
        id
    );
}
