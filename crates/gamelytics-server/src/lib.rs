//! Gamelytics HTTP server library.
//!
//! Each `api_*` module owns a slice of the REST surface and exposes a
//! `routes()` function. [`app`] merges them in [`ROUTES`] order and wraps the
//! result in the shared layers.

pub mod api_accounts;
pub mod api_auth;
pub mod api_events;
pub mod api_games;
pub mod api_keys;
pub mod api_sessions;
pub mod config;
pub mod error;
pub mod extract;
pub mod gate;

use crate::config::{AuthConfig, IngestConfig};
use crate::error::ApiError;
use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use gamelytics_db::DbPool;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Credential transport and admin bootstrap.
    pub auth: AuthConfig,
    /// Ingestion limits.
    pub ingest: IngestConfig,
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Route groups, merged once in this order.
const ROUTES: &[fn() -> Router] = &[
    health_routes,
    api_auth::routes,
    api_accounts::routes,
    api_keys::routes,
    api_games::routes,
    api_sessions::routes,
    api_events::routes,
];

/// Runs `f` with a pooled connection on the blocking thread pool.
///
/// The connection goes back to the pool when `f` returns.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Connection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::Internal(format!("db connection failed: {}", e)))?;
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("task join error: {}", e)))?
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health))
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::Internal(message).into_response()
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    ROUTES
        .iter()
        .fold(Router::new(), |router, routes| router.merge(routes()))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AnyOrigin)
                .allow_methods(AnyOrigin)
                .allow_headers(AnyOrigin),
        )
        .layer(Extension(Arc::new(state)))
}
