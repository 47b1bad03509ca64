//! Application error types.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, warn};

use aiwaah_core::auth::AuthError;
use aiwaah_core::completion::CompletionError;
use aiwaah_core::memory::MemoryError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
///
/// Only `Validation` and `Unauthorized` messages reach the client; the rest
/// answer with a fixed message and keep their detail for the logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::UpstreamUnavailable(detail) => {
                warn!(detail = %detail, "upstream call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_unavailable",
                    "The assistant is temporarily unavailable",
                )
            }
            AppError::PersistenceUnavailable(detail) => {
                warn!(detail = %detail, "memory store failed");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "persistence_unavailable",
                    "Conversation history is temporarily unavailable",
                )
            }
            AppError::Internal(detail) => {
                warn!(detail = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidToken(detail)
            | AuthError::Unauthenticated(detail)
            | AuthError::UpstreamUnavailable(detail) => {
                debug!(detail = %detail, "token rejected");
                AppError::Unauthorized("Invalid or expired token".into())
            }
            AuthError::Config(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        debug!(detail = %e.body_text(), "request body rejected");
        AppError::Validation("Malformed request body".into())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        debug!(detail = %e.body_text(), "query string rejected");
        AppError::Validation("Invalid query parameters".into())
    }
}

impl From<MemoryError> for AppError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::InvalidSubject => AppError::Unauthorized("Invalid or expired token".into()),
            other => AppError::PersistenceUnavailable(other.to_string()),
        }
    }
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        match e {
            CompletionError::Config(msg) => AppError::Internal(msg),
            other => AppError::UpstreamUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn auth_failures_do_not_leak_detail() {
        let err: AppError =
            AuthError::InvalidToken("InvalidSignature from kid test-key-1".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "unauthorized");
        assert!(!json["message"].as_str().unwrap().contains("kid"));
    }

    #[tokio::test]
    async fn completion_failure_is_bad_gateway_without_detail() {
        let err: AppError = CompletionError::Upstream { status: 429 }.into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(resp).await;
        assert!(!json["message"].as_str().unwrap().contains("429"));
    }

    #[tokio::test]
    async fn memory_failure_is_service_unavailable() {
        let err: AppError = MemoryError::Unavailable("pool timed out".into()).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn keyset_outage_is_unauthorized() {
        let err: AppError = AuthError::UpstreamUnavailable("dns".into()).into();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
