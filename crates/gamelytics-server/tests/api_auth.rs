mod common;

use axum::http::{header, Method, Request, StatusCode};
use common::{Auth, TestApp, ADMIN_EMAIL};
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new();
    let (status, body) = app.get("/health", Auth::None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn register_then_login_yields_usable_token() {
    let app = TestApp::new();
    let (id, _) = app.register("alice@example.com").await;

    let (status, body) = app
        .post(
            "/login",
            Auth::None,
            json!({"email": "alice@example.com", "password": "hunter2"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.get("/account", Auth::Token(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["email"], "alice@example.com");
    assert!(body.get("password_hash").is_none());
    assert!(body.get("connection_token").is_none());

    let (status, _) = app.get("/account", Auth::Bearer(&token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn second_login_invalidates_first_token() {
    let app = TestApp::new();
    let (_, first) = app.register("alice@example.com").await;

    let (_, body) = app
        .post(
            "/login",
            Auth::None,
            json!({"email": "alice@example.com", "password": "hunter2"}),
        )
        .await;
    let second = body["token"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let (status, body) = app.get("/account", Auth::Token(&first)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);

    let (status, _) = app.get("/account", Auth::Token(&second)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_sets_cookie() {
    let app = TestApp::new();
    app.register("alice@example.com").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({"email": "alice@example.com", "password": "hunter2"}).to_string(),
        ))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("gamelytics_token="), "{cookie}");
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn registration_failures_are_unauthorized() {
    let app = TestApp::new();
    app.register("alice@example.com").await;

    let cases = [
        json!({"password": "pw"}),
        json!({"email": "not-an-email", "password": "pw"}),
        json!({"email": "bob@example.com"}),
        json!({"email": "alice@example.com", "password": "pw"}),
    ];
    for body in cases {
        let (status, response) = app.post("/register", Auth::None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{body} -> {response}");
        assert_eq!(response["code"], 401);
        assert!(response["description"].is_string());
    }
}

#[tokio::test]
async fn login_failures() {
    let app = TestApp::new();
    app.register("alice@example.com").await;

    let (status, _) = app
        .post(
            "/login",
            Auth::None,
            json!({"email": "nobody@example.com", "password": "hunter2"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/login",
            Auth::None,
            json!({"email": "alice@example.com", "password": "wrong"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/login", Auth::None, json!({"password": "hunter2"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_token() {
    let app = TestApp::new();
    let (_, token) = app.register("alice@example.com").await;

    let (status, _) = app
        .request(Method::POST, "/logout", Auth::Token(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/account", Auth::Token(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn configured_email_registers_as_admin() {
    let app = TestApp::new();
    let (_, admin) = app.register(ADMIN_EMAIL).await;
    let (_, user) = app.register("alice@example.com").await;

    let (status, body) = app.get("/accounts", Auth::Token(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = app.get("/accounts", Auth::Token(&user)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_credentials_are_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app.get("/game", Auth::None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 401);
}

#[tokio::test]
async fn unknown_route_and_bad_json_keep_error_shape() {
    let app = TestApp::new();

    let (status, body) = app.get("/nope", Auth::None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 400);
}
