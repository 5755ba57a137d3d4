//! Session lifecycle handlers.
//!
//! Sessions are opened either by a game client holding an API key (the
//! key's game is used) or by a logged-in publisher naming one of their
//! games. Once closed, a session stays closed.

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Credentials};
use crate::gate::{authorize, can_open_session, owns_session, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{extract::Extension, routing::get, routing::post, Json, Router};
use gamelytics_store::query::{count_events, query_events};
use gamelytics_store::sessions::{create_session, get_session, update_session};
use gamelytics_store::{Event, EventFilter, EventScope, Page, Session, SessionAttrs, SessionPatch};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const OWNER_ANY: Guard = Guard::any(Policy::Owner(owns_session));

pub fn routes() -> Router {
    Router::new()
        .route("/session", post(create_handler))
        .route("/session/{id}", get(get_handler).put(update_handler))
        .route("/session/{id}/events", get(events_handler))
        .route("/session/{id}/events/count", get(events_count_handler))
        .route("/session/{id}/data", get(data_handler))
}

/// Body of `POST /session`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Required for login-token callers; ignored for key callers.
    pub game_id: Option<i64>,
    #[serde(flatten)]
    pub attrs: SessionAttrs,
}

fn session_filter(id: String, page: Page) -> EventFilter {
    EventFilter {
        session: Some(id),
        page,
        ..EventFilter::default()
    }
}

/// Handler for `POST /session`.
pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let params = Params {
        game_id: req.game_id,
        ..Params::none()
    };
    let ctx = authorize(&state, credentials, Guard::any(Policy::Owner(can_open_session)), params)
        .await?;
    let game_id = ctx
        .identity
        .game_id()
        .or(req.game_id)
        .ok_or_else(|| ApiError::Authorization("no game to open a session for".to_string()))?;

    let session = with_conn(&state.pool, move |conn| {
        Ok(create_session(conn, game_id, &req.attrs)?)
    })
    .await?;
    Ok(Json(session))
}

/// Handler for `GET /session/{id}`.
pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Session>, ApiError> {
    authorize(&state, credentials, OWNER_ANY, Params::session(id.clone())).await?;

    let session = with_conn(&state.pool, move |conn| Ok(get_session(conn, &id)?)).await?;
    Ok(Json(session))
}

/// Handler for `PUT /session/{id}`. Returns `{id}`.
pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<String>,
    ApiJson(patch): ApiJson<SessionPatch>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, OWNER_ANY, Params::session(id.clone())).await?;

    let id = with_conn(&state.pool, move |conn| Ok(update_session(conn, &id, &patch)?)).await?;
    Ok(Json(json!({ "id": id })))
}

/// Handler for `GET /session/{id}/events?offset=&count=`.
pub async fn events_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<String>,
    ApiQuery(page): ApiQuery<Page>,
) -> Result<Json<Vec<Event>>, ApiError> {
    authorize(&state, credentials, OWNER_ANY, Params::session(id.clone())).await?;

    let events = with_conn(&state.pool, move |conn| {
        get_session(conn, &id)?;
        Ok(query_events(conn, &session_filter(id, page), &EventScope::Unrestricted)?)
    })
    .await?;
    Ok(Json(events))
}

/// Handler for `GET /session/{id}/events/count`.
pub async fn events_count_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, OWNER_ANY, Params::session(id.clone())).await?;

    let count = with_conn(&state.pool, move |conn| {
        get_session(conn, &id)?;
        Ok(count_events(
            conn,
            &session_filter(id, Page::default()),
            &EventScope::Unrestricted,
        )?)
    })
    .await?;
    Ok(Json(json!({ "count": count })))
}

/// Handler for `GET /session/{id}/data`: the session with its events embedded.
pub async fn data_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(
        &state,
        credentials,
        Guard::login(Policy::Owner(owns_session)),
        Params::session(id.clone()),
    )
    .await?;

    let (session, events) = with_conn(&state.pool, move |conn| {
        let session = get_session(conn, &id)?;
        let events = query_events(
            conn,
            &session_filter(id, Page::default()),
            &EventScope::Unrestricted,
        )?;
        Ok((session, events))
    })
    .await?;

    let mut body = serde_json::to_value(session)
        .map_err(|e| ApiError::Internal(format!("failed to encode session: {}", e)))?;
    if let Value::Object(fields) = &mut body {
        fields.insert("events".to_string(), json!(events));
    }
    Ok(Json(body))
}
