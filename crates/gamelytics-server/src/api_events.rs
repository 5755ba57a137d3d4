//! Event ingestion and querying.

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Credentials};
use crate::gate::{authorize, owns_event, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{extract::Extension, routing::get, Json, Router};
use gamelytics_store::events::get_event;
use gamelytics_store::ingest::ingest;
use gamelytics_store::query::query_events;
use gamelytics_store::{Event, EventFilter, EventSubmission, Page};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/event", get(list_handler).post(ingest_handler))
        .route("/event/{id}", get(get_handler))
}

/// Query string of `GET /event`.
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    pub game: Option<i64>,
    pub session: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub section: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

impl From<EventQuery> for EventFilter {
    fn from(q: EventQuery) -> Self {
        EventFilter {
            game: q.game,
            session: q.session,
            event_type: q.event_type,
            section: q.section,
            after: q.after,
            before: q.before,
            page: Page {
                offset: q.offset,
                count: q.count,
            },
        }
    }
}

/// Handler for `GET /event`.
///
/// Admins read everything, key holders their key's game, publishers the
/// games they publish.
pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiQuery(query): ApiQuery<EventQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::any(Policy::Open), Params::none()).await?;
    let scope = ctx.identity.event_scope();
    let filter = EventFilter::from(query);

    let events = with_conn(&state.pool, move |conn| Ok(query_events(conn, &filter, &scope)?)).await?;
    Ok(Json(events))
}

/// Handler for `POST /event`: one event or a batch. Returns the session ID.
///
/// Requires an API key; a login token carries no game scope.
pub async fn ingest_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiJson(submission): ApiJson<EventSubmission>,
) -> Result<Json<Value>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::any(Policy::Open), Params::none()).await?;
    let game_id = ctx.identity.game_id().ok_or_else(|| {
        ApiError::Authorization("event ingestion requires an api key".to_string())
    })?;
    let max_batch_size = state.ingest.max_batch_size;
    let items = submission.into_items();
    let received = items.len();

    let session_id = with_conn(&state.pool, move |conn| {
        Ok(ingest(conn, game_id, items, max_batch_size)?)
    })
    .await?;

    tracing::info!(game_id, session_id = %session_id, received, "event batch accepted");
    Ok(Json(json!({ "id": session_id })))
}

/// Handler for `GET /event/{id}`.
pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Event>, ApiError> {
    authorize(
        &state,
        credentials,
        Guard::any(Policy::Owner(owns_event)),
        Params::event(id),
    )
    .await?;

    let event = with_conn(&state.pool, move |conn| Ok(get_event(conn, id)?)).await?;
    Ok(Json(event))
}
