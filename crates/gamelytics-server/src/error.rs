//! API error type and its JSON rendering.
//!
//! Every failure leaves the server as `{"code": <number>, "description":
//! <string>}` with the HTTP status equal to `code`. Dashboards branch on
//! `code`, so the mapping below is part of the external contract.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gamelytics_store::StoreError;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// Missing or invalid credential.
    #[error("{0}")]
    Authentication(String),
    /// Valid identity without rights to the resource.
    #[error("{0}")]
    Authorization(String),
    /// Referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Duplicate email. Reported as 401, like the other registration failures.
    #[error("{0}")]
    Conflict(String),
    /// Ingestion of an empty batch. Reported as 401.
    #[error("empty list")]
    EmptyBatch,
    /// Anything unexpected; the raw message is passed through.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The status code (and body `code`) for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_)
            | ApiError::Authorization(_)
            | ApiError::Conflict(_)
            | ApiError::EmptyBatch => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }

        let body = Json(serde_json::json!({
            "code": status.as_u16(),
            "description": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            StoreError::DuplicateEmail(_) => ApiError::Conflict(e.to_string()),
            StoreError::EmptyBatch => ApiError::EmptyBatch,
            StoreError::ForeignSession { .. } => ApiError::Authorization(e.to_string()),
            StoreError::BatchTooLarge { .. }
            | StoreError::GameMismatch { .. }
            | StoreError::InvalidFilter(_) => ApiError::Validation(e.to_string()),
            StoreError::Database(_) | StoreError::Json(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
