#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use gamelytics_db::{create_pool, DbRuntimeSettings};
use gamelytics_server::config::{AuthConfig, IngestConfig};
use gamelytics_server::{app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const COOKIE: &str = "gamelytics_token";

/// A router over a fresh file-backed database.
///
/// The `TempDir` is held so the database outlives the test body.
pub struct TestApp {
    pub router: Router,
    _dir: TempDir,
}

/// How a request authenticates.
#[derive(Clone, Copy)]
pub enum Auth<'a> {
    None,
    Token(&'a str),
    Bearer(&'a str),
    Key(&'a str),
    KeyHeader(&'a str),
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_ingest(IngestConfig::default())
    }

    pub fn with_ingest(ingest: IngestConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = create_pool(db_path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            gamelytics_db::run_migrations(&conn).unwrap();
        }

        let state = AppState {
            pool,
            auth: AuthConfig {
                admin_emails: vec![ADMIN_EMAIL.to_string()],
                ..AuthConfig::default()
            },
            ingest,
        };

        Self {
            router: app(state),
            _dir: dir,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        auth: Auth<'_>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let uri = match auth {
            Auth::Key(key) if uri.contains('?') => format!("{}&key={}", uri, key),
            Auth::Key(key) => format!("{}?key={}", uri, key),
            _ => uri.to_string(),
        };
        let mut builder = Request::builder().method(method).uri(uri);
        builder = match auth {
            Auth::Token(token) => builder.header(header::COOKIE, format!("{}={}", COOKIE, token)),
            Auth::Bearer(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            Auth::KeyHeader(key) => builder.header("x-api-key", key),
            Auth::None | Auth::Key(_) => builder,
        };
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, auth: Auth<'_>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, auth, None).await
    }

    pub async fn post(&self, uri: &str, auth: Auth<'_>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, auth, Some(body)).await
    }

    pub async fn put(&self, uri: &str, auth: Auth<'_>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, auth, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, auth: Auth<'_>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, auth, None).await
    }

    /// Registers an account and returns `(id, token)`.
    pub async fn register(&self, email: &str) -> (i64, String) {
        let (status, body) = self
            .post("/register", Auth::None, json!({"email": email, "password": "hunter2"}))
            .await;
        assert_eq!(status, StatusCode::OK, "register {email}: {body}");
        (
            body["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Creates a game and returns its id.
    pub async fn create_game(&self, token: &str, name: &str) -> i64 {
        let (status, body) = self
            .post("/game", Auth::Token(token), json!({"name": name}))
            .await;
        assert_eq!(status, StatusCode::OK, "create game: {body}");
        body["id"].as_i64().unwrap()
    }

    /// Issues an API key for `game_id` and returns it.
    pub async fn create_key(&self, token: &str, game_id: i64) -> String {
        let (status, body) = self
            .post("/key", Auth::Token(token), json!({"name": "client", "game_id": game_id}))
            .await;
        assert_eq!(status, StatusCode::OK, "create key: {body}");
        body["key"].as_str().unwrap().to_string()
    }

    /// Posts events with `key` and returns the session id.
    pub async fn ingest(&self, key: &str, events: Value) -> String {
        let (status, body) = self.post("/event", Auth::Key(key), events).await;
        assert_eq!(status, StatusCode::OK, "ingest: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}
