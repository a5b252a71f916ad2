/// Unified error types for DocChase
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ChaseError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Plan's monthly chase allowance is used up (reported as a validation error)
    #[error("Validation error: monthly chase limit reached for your plan")]
    ChaseLimitReached,

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email or phone)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Third-party API failures (Twilio, Google Drive, Claude, BankToFile)
    #[error("{service} error: {message}")]
    Vendor { service: &'static str, message: String },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),
}

impl ChaseError {
    pub fn vendor(service: &'static str, message: impl Into<String>) -> Self {
        ChaseError::Vendor {
            service,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ChaseError {
    fn from(e: reqwest::Error) -> Self {
        ChaseError::Vendor {
            service: "http",
            message: e.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ChaseError {
    fn from(e: validator::ValidationErrors) -> Self {
        ChaseError::Validation(e.to_string())
    }
}

/// JSON error body returned to the front-end
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert ChaseError to HTTP response
impl IntoResponse for ChaseError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ChaseError::Authentication(_) | ChaseError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            ChaseError::Authorization(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string()),
            ChaseError::Validation(_) | ChaseError::ChaseLimitReached => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            ChaseError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            ChaseError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            ChaseError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
            ),
            ChaseError::Vendor { .. } => {
                tracing::warn!(error = %self, "vendor call failed");
                (StatusCode::BAD_GATEWAY, "UpstreamError", self.to_string())
            }
            ChaseError::Database(_) | ChaseError::Internal(_) | ChaseError::Io(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for DocChase operations
pub type ChaseResult<T> = Result<T, ChaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (ChaseError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (ChaseError::Authorization("x".into()), StatusCode::FORBIDDEN),
            (ChaseError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ChaseError::ChaseLimitReached, StatusCode::BAD_REQUEST),
            (ChaseError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ChaseError::Conflict("x".into()), StatusCode::CONFLICT),
            (ChaseError::vendor("Twilio", "boom"), StatusCode::BAD_GATEWAY),
            (ChaseError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_leaked() {
        let response = ChaseError::Internal("connection string leaked".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "InternalServerError");
        assert!(!body.message.contains("connection string"));
    }

    #[test]
    fn test_vendor_display() {
        let err = ChaseError::vendor("BankToFile", "HTTP 500");
        assert_eq!(err.to_string(), "BankToFile error: HTTP 500");
    }
}
