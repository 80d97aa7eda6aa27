//! Router-level tests against an in-memory database

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use support_desk::clock::ManualClock;
use support_desk::config::Config;
use support_desk::db::Database;
use support_desk::routes;
use support_desk::services::triage::TriageService;
use support_desk::state::AppState;
use support_desk::tasks::audit_flush::flush_once;

async fn setup() -> (Arc<ManualClock>, AppState, Router) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap(),
    ));
    let db = Database::in_memory(clock.clone()).await.unwrap();
    db.seed_kb_if_empty().await.unwrap();
    let state = AppState::new(db, TriageService::local(), &Config::default());
    let app = routes::router(state.clone());
    (clock, state, app)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &Router, subject: &str, body: &str, email: &str) -> Value {
    let (status, ticket) = send(
        app,
        "POST",
        "/api/tickets",
        Some(json!({"subject": subject, "body": body, "requester": {"email": email}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    ticket
}

#[tokio::test]
async fn create_ticket_with_local_triage() {
    let (_clock, _state, app) = setup().await;
    let ticket = create(&app, "Order late", "my package is 5 days late, very urgent", "a@x.com").await;

    assert_eq!(ticket["category"], "shipping");
    assert_eq!(ticket["priority"], "high");
    assert_eq!(ticket["status"], "new");
    assert_eq!(ticket["sentiment"], "neutral");
    assert_eq!(ticket["channel"], "web");

    let created: chrono::DateTime<Utc> = ticket["created_at"].as_str().unwrap().parse().unwrap();
    let due: chrono::DateTime<Utc> = ticket["sla_due_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(due - created, Duration::hours(12));

    let (status, messages) = send(&app, "GET", "/api/tickets/1/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages[0]["author_type"], "customer");
}

#[tokio::test]
async fn create_ticket_rejects_bad_input() {
    let (_clock, _state, app) = setup().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/tickets",
        Some(json!({"subject": "Hi", "body": "there", "requester": {"email": "not-an-email"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = send(&app, "POST", "/api/tickets", Some(json!({"body": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/tickets", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_ticket_is_404() {
    let (_clock, _state, app) = setup().await;
    let (status, body) = send(&app, "GET", "/api/tickets/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let (status, _) = send(
        &app,
        "POST",
        "/api/tickets/99/status",
        Some(json!({"status": "open"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_ticket_id_is_json_400() {
    let (_clock, _state, app) = setup().await;
    for uri in ["/api/tickets/abc", "/api/tickets/abc/messages", "/api/audit/x1"] {
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["code"], 400);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    let (status, body) = send(
        &app,
        "POST",
        "/api/tickets/public/abc/messages?email=a@x.com",
        Some(json!({"body": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn get_ticket_without_key_shows_placeholder() {
    let (_clock, state, app) = setup().await;
    create(&app, "Broken", "the app shows an error", "b@x.com").await;

    let (status, ticket) = send(&app, "GET", "/api/tickets/1?refreshAi=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        ticket["ai_suggestion"],
        "[AI unavailable: OPENAI_API_KEY missing or invalid]"
    );

    // placeholders are never stored
    let stored = state.db.get_ticket(1).await.unwrap();
    assert!(stored.ai_suggestion.is_none());
}

#[tokio::test]
async fn tags_are_trimmed_and_unique() {
    let (clock, _state, app) = setup().await;
    let ticket = create(&app, "Refund", "please refund me", "c@x.com").await;
    clock.advance(Duration::minutes(1));

    let (_, first) = send(&app, "POST", "/api/tickets/1/tags", Some(json!({"tag": " vip "}))).await;
    let (_, second) = send(&app, "POST", "/api/tickets/1/tags", Some(json!({"tag": "vip"}))).await;
    assert_eq!(first["tags"], json!(["vip"]));
    assert_eq!(second["tags"], json!(["vip"]));

    let (status, _) = send(&app, "POST", "/api/tickets/1/tags", Some(json!({"tag": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, fetched) = send(&app, "GET", "/api/tickets/1", None).await;
    assert_ne!(fetched["updated_at"], ticket["updated_at"]);

    let (_, all) = send(&app, "GET", "/api/tickets/meta/tags", None).await;
    assert_eq!(all, json!(["vip"]));
}

#[tokio::test]
async fn csat_out_of_range_leaves_store_unchanged() {
    let (_clock, _state, app) = setup().await;
    create(&app, "Thanks", "all good", "d@x.com").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/tickets/1/csat",
        Some(json!({"rating": 6, "comment": "great"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for rating in [4, 5] {
        let (status, _) = send(&app, "POST", "/api/tickets/1/csat", Some(json!({"rating": rating}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, report) = send(&app, "GET", "/api/tickets/meta/analytics", None).await;
    assert_eq!(report["total"], 1);
    assert_eq!(report["avgCsat"], 4.5);
    assert_eq!(report["avgFRT"], Value::Null);
    assert_eq!(report["last7"].as_array().unwrap().len(), 7);
    assert_eq!(report["byStatus"], json!([{"status": "new", "count": 1}]));
}

#[tokio::test]
async fn first_response_time_counts_agent_replies_only() {
    let (clock, _state, app) = setup().await;
    create(&app, "Where is my order", "tracking shows nothing", "e@x.com").await;
    create(&app, "Question", "just asking", "f@x.com").await;

    clock.advance(Duration::minutes(30));
    let (status, _) = send(
        &app,
        "POST",
        "/api/tickets/1/messages",
        Some(json!({"body": "Looking into it", "author_type": "agent"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        "POST",
        "/api/tickets/2/messages",
        Some(json!({"body": "More details", "author_type": "requester"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, report) = send(&app, "GET", "/api/tickets/meta/analytics", None).await;
    assert_eq!(report["avgFRT"], 30.0);
}

#[tokio::test]
async fn public_access_is_scoped_by_email() {
    let (_clock, _state, app) = setup().await;
    create(&app, "Help", "need help", "Owner@X.com").await;

    let (status, view) = send(&app, "GET", "/api/tickets/public/1?email=owner@x.com", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["messages"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/tickets/public/1?email=other@x.com", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "GET", "/api/tickets/public/7?email=owner@x.com", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/tickets/public/1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/tickets/public/1/messages?email=other@x.com",
        Some(json!({"body": "let me in"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, message) = send(
        &app,
        "POST",
        "/api/tickets/public/1/messages?email=OWNER@x.com",
        Some(json!({"body": "any update?"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["author_type"], "customer");

    let (_, mine) = send(&app, "GET", "/api/tickets/public?email=owner@x.com", None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn public_portal_lists_non_ascii_requester() {
    let (_clock, _state, app) = setup().await;
    create(&app, "Colis", "où est mon colis", "ÉLODIE@Example.com").await;

    let (status, view) = send(
        &app,
        "GET",
        "/api/tickets/public/1?email=%C3%A9lodie@example.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["ticket"]["id"], 1);

    let (status, mine) = send(
        &app,
        "GET",
        "/api/tickets/public?email=%C3%A9lodie@example.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn audit_trail_is_flushed_from_side_channel() {
    let (_clock, state, app) = setup().await;
    create(&app, "Refund", "refund please", "g@x.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/tickets/1/status")
        .header("content-type", "application/json")
        .header("x-actor", "dana")
        .body(Body::from(json!({"status": "solved"}).to_string()))
        .unwrap();
    assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::OK);

    let request = Request::builder()
        .method("POST")
        .uri("/api/tickets/1/csat")
        .header("content-type", "application/json")
        .header("x-actor", "lee")
        .body(Body::from(json!({"rating": 5}).to_string()))
        .unwrap();
    assert_eq!(
        app.clone().oneshot(request).await.unwrap().status(),
        StatusCode::CREATED
    );

    let (_, before) = send(&app, "GET", "/api/audit/1", None).await;
    assert_eq!(before, json!([]));

    assert_eq!(flush_once(&state.audit, &state.db, &state.metrics).await, 3);

    let (_, trail) = send(&app, "GET", "/api/audit/1", None).await;
    assert_eq!(trail[0]["action"], "csat");
    assert_eq!(trail[0]["actor"], "lee");
    assert_eq!(trail[0]["actor_type"], "agent");
    assert_eq!(trail[0]["payload"]["rating"], 5);
    assert_eq!(trail[1]["action"], "status");
    assert_eq!(trail[1]["actor"], "dana");
    assert_eq!(trail[2]["action"], "create");
    assert_eq!(trail[2]["actor"], "g@x.com");
}

#[tokio::test]
async fn knowledge_base_search_and_create() {
    let (_clock, _state, app) = setup().await;

    let (_, hits) = send(&app, "GET", "/api/kb/search?q=carrier", None).await;
    assert_eq!(hits[0]["title"], "Track your order");

    let (_, none) = send(&app, "GET", "/api/kb/search?q=", None).await;
    assert_eq!(none, json!([]));

    let (status, _) = send(
        &app,
        "POST",
        "/api/kb/articles",
        Some(json!({"title": "Hi", "body": "short"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, article) = send(
        &app,
        "POST",
        "/api/kb/articles",
        Some(json!({"title": "Gift cards", "body": "Gift cards never expire and can be combined.", "tags": ["billing"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = send(&app, "GET", "/api/kb/articles", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 4);

    let uri = format!("/api/kb/articles/{}", article["id"]);
    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["tags"], json!(["billing"]));
}

#[tokio::test]
async fn magic_link_is_single_use() {
    let (_clock, _state, app) = setup().await;

    let (status, _) = send(&app, "POST", "/api/auth/magic-link", Some(json!({"email": " "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, link) = send(
        &app,
        "POST",
        "/api/auth/magic-link",
        Some(json!({"email": "Pat@Example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(link["expires_in_seconds"], 900);
    let url = link["url"].as_str().unwrap();
    let token = url.split("token=").nth(1).unwrap();

    let consume = format!("/api/auth/magic-link/consume?token={}", token);
    let (status, body) = send(&app, "GET", &consume, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "pat@example.com");

    let (status, body) = send(&app, "GET", &consume, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_or_expired");
}

#[tokio::test]
async fn presence_expires_after_ttl() {
    let (clock, _state, app) = setup().await;

    send(&app, "POST", "/api/presence/3", Some(json!({"agentId": "sam"}))).await;
    send(&app, "POST", "/api/presence/3", None).await;
    let (_, body) = send(&app, "GET", "/api/presence/3", None).await;
    assert_eq!(body["viewers"], json!(["agent", "sam"]));

    send(&app, "DELETE", "/api/presence/3", Some(json!({"agentId": "sam"}))).await;
    let (_, body) = send(&app, "GET", "/api/presence/3", None).await;
    assert_eq!(body["viewers"], json!(["agent"]));

    clock.advance(Duration::seconds(31));
    let (_, body) = send(&app, "GET", "/api/presence/3", None).await;
    assert_eq!(body["viewers"], json!([]));
}

#[tokio::test]
async fn macros_and_health() {
    let (_clock, _state, app) = setup().await;

    let (_, macros) = send(&app, "GET", "/api/tickets/meta/macros", None).await;
    assert_eq!(macros.as_array().unwrap().len(), 3);

    let (status, health) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");

    let (status, ready) = send(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ready["checks"]["triage"]["message"], "Local classifier only");

    let (status, probe) = send(
        &app,
        "POST",
        "/api/tickets/test-ai",
        Some(json!({"subject": "Chargeback", "body": "I want to cancel"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(probe["category"], "refund");
    assert_eq!(probe["source"], "local-fallback");
}
