//! Registration, login and logout.
//!
//! Login issues a fresh connection token and overwrites the stored one, so
//! each account has at most one live token. The token is returned in the
//! body and as a cookie.

use crate::error::ApiError;
use crate::extract::{ApiJson, Credentials};
use crate::gate::{authorize, Guard, Params, Policy};
use crate::{with_conn, AppState};
use axum::{
    extract::Extension,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use gamelytics_store::accounts::{
    create_account, find_account_by_email, issue_connection_token, set_connection_token,
    NewAccount,
};
use gamelytics_store::credentials::{hash_password, verify_password};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn routes() -> Router {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
}

/// Body of `POST /register` and `POST /login`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Minimal shape check: one `@`, non-empty local part, dotted domain.
pub(crate) fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Pulls a valid email and a non-empty password out of the request.
///
/// Both failures are authentication errors (401), not validation errors.
pub(crate) fn require_credentials(req: CredentialsRequest) -> Result<(String, String), ApiError> {
    let email = req
        .email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Authentication("missing email".to_string()))?;
    if !is_valid_email(&email) {
        return Err(ApiError::Authentication(format!("invalid email: {}", email)));
    }
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::Authentication("missing password".to_string()))?;
    Ok((email, password))
}

fn token_cookie(name: &str, token: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, token))
        .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))
}

fn expired_cookie(name: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(&format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        name
    ))
    .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))
}

/// Handler for `POST /register`.
pub async fn register_handler(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let (email, password) = require_credentials(req)?;
    let is_admin = state.auth.is_admin_email(&email);

    let (id, token) = with_conn(&state.pool, move |conn| {
        let account = create_account(
            conn,
            &NewAccount {
                email,
                password_hash: hash_password(&password),
                is_admin,
            },
        )?;
        let token = issue_connection_token(conn, account.id)?;
        Ok((account.id, token))
    })
    .await?;

    tracing::info!(account_id = id, is_admin, "account registered");

    let cookie = token_cookie(&state.auth.cookie_name, &token)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "id": id, "token": token })),
    )
        .into_response())
}

/// Handler for `POST /login`.
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    ApiJson(req): ApiJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let (email, password) = require_credentials(req)?;

    let (id, token) = with_conn(&state.pool, move |conn| {
        let account = find_account_by_email(conn, &email)?
            .ok_or_else(|| ApiError::NotFound(format!("no account for {}", email)))?;
        if !verify_password(&password, &account.password_hash) {
            return Err(ApiError::Authentication("wrong password".to_string()));
        }
        let token = issue_connection_token(conn, account.id)?;
        Ok((account.id, token))
    })
    .await?;

    tracing::debug!(account_id = id, "login succeeded");

    let cookie = token_cookie(&state.auth.cookie_name, &token)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "token": token }))).into_response())
}

/// Handler for `POST /logout`. Invalidates the caller's token.
pub async fn logout_handler(
    Extension(state): Extension<Arc<AppState>>,
    credentials: Credentials,
) -> Result<Response, ApiError> {
    let ctx = authorize(&state, credentials, Guard::login(Policy::Open), Params::none()).await?;
    let account_id = ctx.identity.account().id;

    with_conn(&state.pool, move |conn| {
        set_connection_token(conn, account_id, None)?;
        Ok(())
    })
    .await?;

    let cookie = expired_cookie(&state.auth.cookie_name)?;
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "status": "ok" }))).into_response())
}
