//! API key registry handlers.

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, Credentials};
use crate::gate::{authorize, owns_game, owns_key, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{
    extract::Extension,
    routing::{delete, get, post},
    Json, Router,
};
use gamelytics_store::keys::{create_key, delete_key, delete_keys_for_account, list_keys_for_account};
use gamelytics_store::ApiKey;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/key", post(create_handler))
        .route("/key/{key}", delete(delete_handler))
        .route("/keys", get(list_handler).delete(delete_all_handler))
}

/// Body of `POST /key`.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    pub name: String,
    pub game_id: Option<i64>,
}

/// Handler for `POST /key`. Issues a key for a game the caller publishes.
pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiJson(req): ApiJson<CreateKeyRequest>,
) -> Result<Json<ApiKey>, ApiError> {
    let params = Params {
        game_id: req.game_id,
        ..Params::none()
    };
    let ctx = authorize(&state, credentials, Guard::login(Policy::Owner(owns_game)), params).await?;
    let game_id = req
        .game_id
        .ok_or_else(|| ApiError::Validation("game_id is required".to_string()))?;
    let account_id = ctx.identity.account().id;

    let key = with_conn(&state.pool, move |conn| {
        Ok(create_key(conn, &req.name, account_id, game_id)?)
    })
    .await?;
    Ok(Json(key))
}

/// Handler for `DELETE /key/{key}`.
pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(key): ApiPath<String>,
) -> Result<Json<Value>, ApiError> {
    authorize(
        &state,
        credentials,
        Guard::login(Policy::Owner(owns_key)),
        Params::key(key.clone()),
    )
    .await?;

    let deleted = key.clone();
    with_conn(&state.pool, move |conn| Ok(delete_key(conn, &deleted)?)).await?;
    Ok(Json(json!({ "key": key })))
}

/// Handler for `GET /keys`: the keys the caller issued.
pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Json<Vec<ApiKey>>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    let account_id = ctx.identity.account().id;

    let keys = with_conn(&state.pool, move |conn| {
        Ok(list_keys_for_account(conn, account_id)?)
    })
    .await?;
    Ok(Json(keys))
}

/// Handler for `DELETE /keys`: revokes every key the caller issued.
pub async fn delete_all_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Json<Value>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    let account_id = ctx.identity.account().id;

    let removed = with_conn(&state.pool, move |conn| {
        Ok(delete_keys_for_account(conn, account_id)?)
    })
    .await?;
    Ok(Json(json!({ "deleted": removed })))
}
