//! Error taxonomy for the authentication subsystem.
//!
//! Validation problems are detected at component boundaries before any
//! mutation; storage faults are logged with detail but surfaced to callers as
//! an opaque 500.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient role, required: {required}")]
    Forbidden { required: &'static str },

    #[error("not found")]
    NotFound,

    #[error("username already exists")]
    Conflict,

    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            Self::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "insufficient role", "required": required })),
            )
                .into_response(),
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Conflict => (
                StatusCode::CONFLICT,
                Json(json!({ "error": "username already exists" })),
            )
                .into_response(),
            Self::Storage(err) => {
                // Detail stays in the logs; callers get an opaque 500.
                error!("storage failure: {err:#}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
