//! Error types for the engine gate.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The single failure kind of engine initialization.
///
/// Every bootstrap step reports failures as this type. The message is kept
/// verbatim and shared, so every observer of one failed attempt sees the same
/// value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InitializationFailed {
    message: Arc<str>,
}

impl InitializationFailed {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Arc::from(message.into()),
        }
    }

    /// Diagnostic text of the step that failed.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether both values come from the same failed attempt.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.message, &other.message)
    }
}

/// Error types for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Engine is still initializing")]
    EngineInitializing,

    #[error("{0}")]
    EngineFailed(InitializationFailed),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Engine communication error: {0}")]
    Communication(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::EngineInitializing => (StatusCode::SERVICE_UNAVAILABLE, "engine_initializing"),
            Error::EngineFailed(_) => (StatusCode::SERVICE_UNAVAILABLE, "engine_failed"),
            Error::QueryFailed(_) => (StatusCode::UNPROCESSABLE_ENTITY, "query_failed"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::Communication(_) => (StatusCode::BAD_GATEWAY, "communication_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_failed_display_is_verbatim() {
        let err = InitializationFailed::new("bundle resolution timed out");
        assert_eq!(err.to_string(), "bundle resolution timed out");
        assert_eq!(err.message(), "bundle resolution timed out");
    }

    #[test]
    fn test_initialization_failed_identity() {
        let err = InitializationFailed::new("boom");
        let shared = err.clone();
        let other = InitializationFailed::new("boom");

        assert!(err.same_as(&shared));
        assert!(!err.same_as(&other));
        assert_eq!(err, other);
    }

    #[test]
    fn test_engine_failed_surfaces_message() {
        let err = Error::EngineFailed(InitializationFailed::new("worker exited"));
        assert_eq!(err.to_string(), "worker exited");
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::EngineInitializing.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Conflict("x".to_string()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Communication("x".to_string()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
