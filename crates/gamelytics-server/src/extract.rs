//! Request extractors.
//!
//! The `Api*` wrappers behave like their axum counterparts but reject with
//! [`ApiError`], so malformed input still gets the `{code, description}`
//! body. [`Credentials`] collects the raw login token and API key; it does
//! not resolve them, that is the job of [`crate::gate::authorize`].

use crate::error::ApiError;
use crate::AppState;
use axum::extract::{FromRequest, FromRequestParts, Query};
use axum::http::{header, request::Parts, HeaderMap};
use serde::Deserialize;
use std::sync::Arc;

/// JSON body extractor rejecting with [`ApiError::Validation`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor rejecting with [`ApiError::Validation`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path extractor rejecting with [`ApiError::Validation`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Raw credentials presented with a request.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Login token from the session cookie or `Authorization: Bearer`.
    pub login_token: Option<String>,
    /// API key from the `key` query parameter or the `X-Api-Key` header.
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
struct KeyParam {
    key: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| non_empty(value))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(non_empty)
}

impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<Arc<AppState>>()
            .ok_or_else(|| ApiError::Internal("application state missing".to_string()))?;

        let login_token = cookie_value(&parts.headers, &state.auth.cookie_name)
            .or_else(|| bearer_token(&parts.headers));

        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(non_empty)
            .or_else(|| {
                Query::<KeyParam>::try_from_uri(&parts.uri)
                    .ok()
                    .and_then(|Query(param)| param.key)
                    .and_then(|key| non_empty(&key))
            });

        Ok(Self {
            login_token,
            api_key,
        })
    }
}
