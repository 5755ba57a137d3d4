mod common;

use axum::http::StatusCode;
use common::{Auth, TestApp, ADMIN_EMAIL};
use gamelytics_server::config::IngestConfig;
use serde_json::{json, Value};

struct Publisher {
    token: String,
    game: i64,
    key: String,
}

async fn publisher(app: &TestApp, email: &str) -> Publisher {
    let (_, token) = app.register(email).await;
    let game = app.create_game(&token, "g").await;
    let key = app.create_key(&token, game).await;
    Publisher { token, game, key }
}

fn types(events: &Value) -> Vec<String> {
    events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn ingest_scenario_lands_in_one_new_session() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;

    let session = app
        .ingest(
            &alice.key,
            json!([{"type": "start"}, {"type": "win", "session_id": "bogus"}]),
        )
        .await;
    assert_ne!(session, "bogus");

    let (status, body) = app
        .get(
            &format!("/session/{session}/events/count"),
            Auth::Token(&alice.token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = app
        .get(
            &format!("/game/{}/sessions/count", alice.game),
            Auth::Token(&alice.token),
        )
        .await;
    assert_eq!(body["count"], 1);

    let (status, _) = app.get("/session/bogus", Auth::Token(&alice.token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn single_event_and_session_reuse() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;

    let session = app.ingest(&alice.key, json!({"type": "start"})).await;
    let again = app
        .ingest(&alice.key, json!([{"type": "move", "session_id": session}]))
        .await;
    assert_eq!(session, again);

    let (_, events) = app
        .get(&format!("/session/{session}/events"), Auth::Key(&alice.key))
        .await;
    assert_eq!(types(&events), vec!["start", "move"]);
    assert_eq!(events[0]["custom_data"], json!({}));
    assert_eq!(events[0]["coordinates"], json!({}));
}

#[tokio::test]
async fn empty_batch_is_unauthorized() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;

    let (status, body) = app.post("/event", Auth::Key(&alice.key), json!([])).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
    assert_eq!(body["description"], "empty list");
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let app = TestApp::with_ingest(IngestConfig { max_batch_size: 2 });
    let alice = publisher(&app, "alice@example.com").await;

    let (status, _) = app
        .post("/event", Auth::Key(&alice.key), json!([{}, {}, {}]))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ingestion_requires_key_scope() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;

    let (status, _) = app
        .post("/event", Auth::Token(&alice.token), json!([{"type": "x"}]))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/event", Auth::Key("deadbeef"), json!([{"type": "x"}]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post("/event", Auth::KeyHeader(&alice.key), json!([{"type": "x"}]))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn foreign_session_is_refused() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    let bob = publisher(&app, "bob@example.com").await;
    let bobs = app.ingest(&bob.key, json!({"type": "start"})).await;

    let (status, _) = app
        .post(
            "/event",
            Auth::Key(&alice.key),
            json!([{"type": "x", "session_id": bobs}]),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app
        .get(&format!("/session/{bobs}/events/count"), Auth::Token(&bob.token))
        .await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn key_scope_mismatch_names_both_games() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    let bob = publisher(&app, "bob@example.com").await;

    let (status, body) = app
        .get(&format!("/event?game={}", bob.game), Auth::Key(&alice.key))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let description = body["description"].as_str().unwrap();
    assert!(description.contains(&bob.game.to_string()), "{description}");
    assert!(description.contains(&alice.game.to_string()), "{description}");
}

#[tokio::test]
async fn listing_is_scoped_by_identity() {
    let app = TestApp::new();
    let (_, admin) = app.register(ADMIN_EMAIL).await;
    let alice = publisher(&app, "alice@example.com").await;
    let bob = publisher(&app, "bob@example.com").await;
    app.ingest(&alice.key, json!([{"type": "a1"}, {"type": "a2"}])).await;
    app.ingest(&bob.key, json!([{"type": "b1"}])).await;

    let (_, events) = app.get("/event", Auth::Key(&alice.key)).await;
    assert_eq!(types(&events), vec!["a1", "a2"]);

    let (_, events) = app.get("/event", Auth::Token(&bob.token)).await;
    assert_eq!(types(&events), vec!["b1"]);

    let (_, events) = app.get("/event", Auth::Token(&admin)).await;
    assert_eq!(types(&events), vec!["a1", "a2", "b1"]);

    let (_, events) = app
        .get(&format!("/event?game={}", alice.game), Auth::Token(&bob.token))
        .await;
    assert!(events.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn section_filter_is_exact() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    app.ingest(
        &alice.key,
        json!([
            {"type": "a", "section": "level"},
            {"type": "b", "section": "level/2"},
            {"type": "c", "section": "level"}
        ]),
    )
    .await;

    let (_, events) = app.get("/event?section=level", Auth::Key(&alice.key)).await;
    assert_eq!(types(&events), vec!["a", "c"]);

    let (_, events) = app.get("/event?type=b", Auth::Key(&alice.key)).await;
    assert_eq!(types(&events), vec!["b"]);
}

#[tokio::test]
async fn no_default_page_cap() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    let batch: Vec<Value> = (0..250).map(|i| json!({"type": format!("e{i}")})).collect();
    app.ingest(&alice.key, Value::Array(batch)).await;

    let (_, events) = app.get("/event", Auth::Key(&alice.key)).await;
    assert_eq!(events.as_array().unwrap().len(), 250);

    let (_, events) = app
        .get("/event?offset=10&count=5", Auth::Key(&alice.key))
        .await;
    assert_eq!(types(&events), vec!["e10", "e11", "e12", "e13", "e14"]);
}

#[tokio::test]
async fn time_bounds_are_validated() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    app.ingest(&alice.key, json!([{"type": "a"}])).await;

    let (status, _) = app
        .get("/event?after=yesterday", Auth::Key(&alice.key))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, events) = app
        .get("/event?after=2000-01-01T00:00:00Z", Auth::Key(&alice.key))
        .await;
    assert_eq!(types(&events), vec!["a"]);

    let (_, events) = app
        .get("/event?before=2000-01-01T00:00:00Z", Auth::Key(&alice.key))
        .await;
    assert!(events.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn single_event_is_owner_scoped() {
    let app = TestApp::new();
    let alice = publisher(&app, "alice@example.com").await;
    let bob = publisher(&app, "bob@example.com").await;
    app.ingest(&alice.key, json!({"type": "a", "user_time": 42})).await;

    let (_, events) = app.get("/event", Auth::Key(&alice.key)).await;
    let id = events[0]["id"].as_i64().unwrap();
    let uri = format!("/event/{id}");

    let (status, event) = app.get(&uri, Auth::Key(&alice.key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(event["user_time"], 42);

    let (status, _) = app.get(&uri, Auth::Token(&bob.token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get(&uri, Auth::Key(&bob.key)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/event/99999", Auth::Key(&bob.key)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
