use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::AuthError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ServerError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ServerError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::InvalidInput(_) => ServerError::BadRequest(message),
            AuthError::NotFound(_) | AuthError::SessionNotFound => ServerError::NotFound(message),
            AuthError::EmailMismatch { .. } => ServerError::Conflict(message),
            AuthError::Upstream { .. } | AuthError::Http(_) | AuthError::OAuth(_) => {
                ServerError::Upstream(message)
            }
            AuthError::NoCredentials
            | AuthError::ListenerBind(_)
            | AuthError::Entropy(_)
            | AuthError::Configuration(_)
            | AuthError::Json(_) => {
                tracing::error!("Internal error: {}", message);
                ServerError::Internal(message)
            }
        }
    }
}
