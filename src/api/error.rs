use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::{app, node, registry};

/// Failure of an API request, rendered as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<registry::Error> for ApiError {
    fn from(err: registry::Error) -> Self {
        match err {
            registry::Error::NotFound(_) => ApiError::NotFound(err.to_string()),
            registry::Error::DuplicateId(_) | registry::Error::Cycle { .. } => {
                ApiError::Conflict(err.to_string())
            }
            registry::Error::NotADevice(_) => ApiError::Unprocessable(err.to_string()),
            registry::Error::Load(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<app::Error> for ApiError {
    fn from(err: app::Error) -> Self {
        match err {
            app::Error::Registry(err) => err.into(),
            app::Error::Cancelled => ApiError::Internal(err.to_string()),
        }
    }
}

/// Malformed or mistyped request bodies.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Unprocessable(rejection.body_text())
    }
}

impl From<node::Error> for ApiError {
    fn from(err: node::Error) -> Self {
        ApiError::Unprocessable(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::Internal(message) => {
                log::error!(target: "api", "internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal error occurred".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
