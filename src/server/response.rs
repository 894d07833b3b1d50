use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::error::ChoreError;

/// JSON error body: `{"error": message}` plus `detail` outside production.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Map a repository error. Server-side failures get the generic
    /// `failure` message and are logged; `expose_detail` adds the cause.
    pub fn from_chore(err: ChoreError, failure: &str, expose_detail: bool) -> Self {
        match err {
            ChoreError::Validation(message) => Self::bad_request(message),
            ChoreError::NotFound => Self::not_found("Chore not found"),
            other => Self::internal(failure, &other, expose_detail),
        }
    }

    /// A logged 500 with the generic `failure` message.
    pub fn internal(failure: &str, cause: &dyn std::fmt::Display, expose_detail: bool) -> Self {
        error!("{}: {}", failure, cause);
        let mut api = Self::new(StatusCode::INTERNAL_SERVER_ERROR, failure);
        if expose_detail {
            api.detail = Some(cause.to_string());
        }
        api
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.detail {
            Some(detail) => json!({"error": self.message, "detail": detail}),
            None => json!({"error": self.message}),
        };
        (self.status, Json(body)).into_response()
    }
}
