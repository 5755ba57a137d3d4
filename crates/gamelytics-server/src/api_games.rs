//! Game handlers and per-game session listings.

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, Credentials};
use crate::gate::{authorize, owns_game, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{extract::Extension, routing::get, Json, Router};
use gamelytics_store::games::{create_game, delete_game, get_game, list_games, update_game};
use gamelytics_store::sessions::{count_sessions_by_game, list_sessions_by_game};
use gamelytics_store::{Game, NewGame, Page, Session, UpdateGameParams};
use serde_json::{json, Value};
use std::sync::Arc;

const OWNER: Guard = Guard::login(Policy::Owner(owns_game));

pub fn routes() -> Router {
    Router::new()
        .route("/game", get(list_handler).post(create_handler))
        .route(
            "/game/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/game/{id}/data", get(data_handler))
        .route("/game/{id}/sessions", get(sessions_handler))
        .route("/game/{id}/sessions/count", get(sessions_count_handler))
}

/// Handler for `GET /game`. Publishers see their own games, admins all.
pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Json<Vec<Game>>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    let publisher = (!ctx.identity.is_admin()).then(|| ctx.identity.account().id);

    let games = with_conn(&state.pool, move |conn| Ok(list_games(conn, publisher)?)).await?;
    Ok(Json(games))
}

/// Handler for `POST /game`. The caller becomes the publisher.
pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiJson(game): ApiJson<NewGame>,
) -> Result<Json<Game>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    if game.name.trim().is_empty() {
        return Err(ApiError::Validation("game name is required".to_string()));
    }
    let publisher_id = ctx.identity.account().id;

    let game = with_conn(&state.pool, move |conn| Ok(create_game(conn, publisher_id, &game)?)).await?;
    Ok(Json(game))
}

/// Handler for `GET /game/{id}`.
pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Game>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;

    let game = with_conn(&state.pool, move |conn| Ok(get_game(conn, id)?)).await?;
    Ok(Json(game))
}

/// Handler for `PUT /game/{id}`.
pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
    ApiJson(updates): ApiJson<UpdateGameParams>,
) -> Result<Json<Game>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;
    if updates.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::Validation("game name must not be empty".to_string()));
    }

    let game = with_conn(&state.pool, move |conn| Ok(update_game(conn, id, &updates)?)).await?;
    Ok(Json(game))
}

/// Handler for `DELETE /game/{id}`. Keys, sessions and events cascade.
pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;

    with_conn(&state.pool, move |conn| Ok(delete_game(conn, id)?)).await?;
    Ok(Json(json!({ "id": id })))
}

/// Handler for `GET /game/{id}/data`: the game with its sessions embedded.
pub async fn data_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;

    let (game, sessions) = with_conn(&state.pool, move |conn| {
        let game = get_game(conn, id)?;
        let sessions = list_sessions_by_game(conn, id, &Page::default())?;
        Ok((game, sessions))
    })
    .await?;

    let mut body = serde_json::to_value(game)
        .map_err(|e| ApiError::Internal(format!("failed to encode game: {}", e)))?;
    if let Value::Object(fields) = &mut body {
        fields.insert("sessions".to_string(), json!(sessions));
    }
    Ok(Json(body))
}

/// Handler for `GET /game/{id}/sessions?offset=&count=`.
pub async fn sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
    ApiQuery(page): ApiQuery<Page>,
) -> Result<Json<Vec<Session>>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;

    let sessions = with_conn(&state.pool, move |conn| {
        get_game(conn, id)?;
        Ok(list_sessions_by_game(conn, id, &page)?)
    })
    .await?;
    Ok(Json(sessions))
}

/// Handler for `GET /game/{id}/sessions/count`.
pub async fn sessions_count_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, OWNER, Params::game(id)).await?;

    let count = with_conn(&state.pool, move |conn| {
        get_game(conn, id)?;
        Ok(count_sessions_by_game(conn, id)?)
    })
    .await?;
    Ok(Json(json!({ "count": count })))
}
