//! Crate-wide error type and result alias.
//!
//! Provider failures are recovered locally (fallback responder) and never
//! reach a client; only validation, rate-limit, and unexpected internal
//! failures surface on the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConfideError>;

/// All error conditions confide distinguishes.
#[derive(Debug, Error)]
pub enum ConfideError {
    /// Empty or malformed client input. Always user-visible, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Admission denied by the rate limiter. Client retries later.
    #[error("rate limit exceeded")]
    RateLimited,

    /// A remote or local responder failed. Recovered via the fallback
    /// responder; logged, never surfaced to the client.
    #[error("provider error: {0}")]
    Provider(String),

    /// Unexpected failure in bridge or store logic. Surfaced as a generic
    /// error; detail stays in the server logs.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfideError {
    /// HTTP status for the REST surface.
    pub fn status(&self) -> StatusCode {
        match self {
            ConfideError::Validation(_) => StatusCode::BAD_REQUEST,
            ConfideError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ConfideError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
            ConfideError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Provider/internal detail stays server-side.
    pub fn public_message(&self) -> String {
        match self {
            ConfideError::Validation(msg) => msg.clone(),
            ConfideError::RateLimited => {
                "Rate limit exceeded. Please wait before sending another message.".to_string()
            }
            ConfideError::Provider(_) => "Provider unavailable".to_string(),
            ConfideError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ConfideError {
    fn into_response(self) -> Response {
        if matches!(self, ConfideError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let body = Json(json!({ "error": self.public_message() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ConfideError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ConfideError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ConfideError::Provider("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ConfideError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = ConfideError::Validation("Text field is required".into());
        assert_eq!(err.public_message(), "Text field is required");
    }

    #[test]
    fn test_provider_detail_not_leaked() {
        let err = ConfideError::Provider("api key sk-123 rejected".into());
        assert!(!err.public_message().contains("sk-123"));
    }

    #[test]
    fn test_display_includes_detail() {
        let err = ConfideError::Provider("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }
}
