//! Central error type for all route handlers.
//!
//! Every handler returns [`AppResult<T>`]; the [`IntoResponse`] impl turns an
//! error into a `{"message": ...}` JSON body with the matching status code.
//! Internal errors are logged with full detail and surfaced to the caller as a
//! generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed input (400).
    BadRequest(String),
    /// Unique constraint violated — username, email or subject name (400).
    Duplicate(String),
    /// No valid bearer token (401).
    Unauthorized,
    /// Authenticated but not allowed (403).
    Forbidden,
    /// Row or blob does not exist (404).
    NotFound,
    /// Upload MIME type outside the allow-list (400).
    UnsupportedType,
    /// Upload exceeds the configured size ceiling (400).
    TooLarge,
    /// Anything unexpected (500). Detail is logged, not leaked.
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Duplicate(msg)  => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized    => (StatusCode::UNAUTHORIZED, "Authentication required".into()),
            AppError::Forbidden       => (StatusCode::FORBIDDEN, "You are not allowed to do that".into()),
            AppError::NotFound        => (StatusCode::NOT_FOUND, "Not found".into()),
            AppError::UnsupportedType => (StatusCode::BAD_REQUEST, "Unsupported file type".into()),
            AppError::TooLarge        => (StatusCode::BAD_REQUEST, "File is too large".into()),
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        // A racy check-then-insert can still hit the unique index; translate
        // the driver error instead of replying with a generic 500.
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return AppError::Duplicate("Username, email or name already exists".into());
            }
        }
        AppError::Internal(anyhow::anyhow!(err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        for err in [
            AppError::BadRequest("x".into()),
            AppError::Duplicate("x".into()),
            AppError::UnsupportedType,
            AppError::TooLarge,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn auth_errors_keep_their_status() {
        assert_eq!(AppError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let response = AppError::Internal(anyhow::anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
