//! Account management handlers.

use crate::api_auth::{is_valid_email, require_credentials, CredentialsRequest};
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, Credentials};
use crate::gate::{authorize, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{
    extract::Extension,
    routing::get,
    Json, Router,
};
use gamelytics_store::accounts::{
    create_account, delete_account, get_account, list_accounts, update_account,
};
use gamelytics_store::credentials::hash_password;
use gamelytics_store::{Account, NewAccount, UpdateAccountParams};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/account", get(get_self_handler).post(create_handler))
        .route(
            "/account/{id}",
            get(get_handler).put(update_handler).delete(delete_handler),
        )
        .route("/accounts", get(list_handler))
}

/// Body of `POST /account`.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Body of `PUT /account/{id}`. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAccountRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

/// Handler for `GET /account`: the caller's own account.
pub async fn get_self_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Json<Account>, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    Ok(Json(ctx.identity.account().clone()))
}

/// Handler for `POST /account`. Admin only.
pub async fn create_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiJson(req): ApiJson<CreateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    authorize(&state, credentials, Guard::login(Policy::AdminOnly), Params::none()).await?;

    let (email, password) = require_credentials(CredentialsRequest {
        email: req.email,
        password: req.password,
    })?;
    let is_admin = req.is_admin;

    let account = with_conn(&state.pool, move |conn| {
        Ok(create_account(
            conn,
            &NewAccount {
                email,
                password_hash: hash_password(&password),
                is_admin,
            },
        )?)
    })
    .await?;

    tracing::info!(account_id = account.id, is_admin, "account created by admin");
    Ok(Json(account))
}

/// Handler for `GET /account/{id}`.
pub async fn get_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Account>, ApiError> {
    authorize(&state, credentials, Guard::login(Policy::SelfOrAdmin), Params::account(id)).await?;

    let account = with_conn(&state.pool, move |conn| Ok(get_account(conn, id)?)).await?;
    Ok(Json(account))
}

/// Handler for `PUT /account/{id}`.
///
/// Only admins may change `is_admin`.
pub async fn update_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateAccountRequest>,
) -> Result<Json<Account>, ApiError> {
    let ctx =
        authorize(&state, credentials, Guard::login(Policy::SelfOrAdmin), Params::account(id))
            .await?;

    if req.is_admin.is_some() && !ctx.identity.is_admin() {
        return Err(ApiError::Authorization(
            "only admins may change admin status".to_string(),
        ));
    }
    let email = req.email.map(|e| e.trim().to_string());
    if let Some(email) = email.as_deref() {
        if !is_valid_email(email) {
            return Err(ApiError::Validation(format!("invalid email: {}", email)));
        }
    }
    if req.password.as_deref() == Some("") {
        return Err(ApiError::Validation("password must not be empty".to_string()));
    }

    let updates = UpdateAccountParams {
        email,
        password_hash: req.password.as_deref().map(hash_password),
        is_admin: req.is_admin,
    };
    let account = with_conn(&state.pool, move |conn| Ok(update_account(conn, id, &updates)?)).await?;
    Ok(Json(account))
}

/// Handler for `DELETE /account/{id}`. Everything the account published goes with it.
pub async fn delete_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>, ApiError> {
    authorize(&state, credentials, Guard::login(Policy::SelfOrAdmin), Params::account(id)).await?;

    with_conn(&state.pool, move |conn| Ok(delete_account(conn, id)?)).await?;
    Ok(Json(json!({ "id": id })))
}

/// Handler for `GET /accounts`. Admin only.
pub async fn list_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Json<Vec<Account>>, ApiError> {
    authorize(&state, credentials, Guard::login(Policy::AdminOnly), Params::none()).await?;

    let accounts = with_conn(&state.pool, |conn| Ok(list_accounts(conn)?)).await?;
    Ok(Json(accounts))
}
