use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Service not retryable: {0}")]
    ServiceNotRetryable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Scan quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unknown error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl ApiError {
    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid transition error
    pub fn invalid_transition<T: Into<String>>(msg: T) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a new rate limit error
    pub fn rate_limit<T: Into<String>>(msg: T) -> Self {
        Self::RateLimit(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();

        let (status, error_message, error_code) = match self {
            ApiError::Validation(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "validation error occurred"
                );
                (StatusCode::BAD_REQUEST, msg.as_str(), "VALIDATION_ERROR")
            }
            ApiError::UnknownService(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "unknown service requested"
                );
                (StatusCode::BAD_REQUEST, msg.as_str(), "UNKNOWN_SERVICE")
            }
            ApiError::InvalidTransition(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "invalid scan state transition"
                );
                (StatusCode::BAD_REQUEST, msg.as_str(), "INVALID_TRANSITION")
            }
            ApiError::ServiceNotRetryable(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "retry requested for ineligible service"
                );
                (
                    StatusCode::BAD_REQUEST,
                    msg.as_str(),
                    "SERVICE_NOT_RETRYABLE",
                )
            }
            ApiError::NotFound(ref msg) => {
                tracing::info!(
                    error_id = %error_id,
                    error = %msg,
                    "resource not found"
                );
                (StatusCode::NOT_FOUND, msg.as_str(), "NOT_FOUND")
            }
            ApiError::RateLimit(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "rate limit exceeded"
                );
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    msg.as_str(),
                    "RATE_LIMIT_EXCEEDED",
                )
            }
            ApiError::QuotaExceeded(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "scan quota exceeded"
                );
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    msg.as_str(),
                    "SCAN_QUOTA_EXCEEDED",
                )
            }
            ApiError::Timeout(ref msg) => {
                tracing::warn!(
                    error_id = %error_id,
                    error = %msg,
                    "timeout error occurred"
                );
                (StatusCode::REQUEST_TIMEOUT, msg.as_str(), "TIMEOUT_ERROR")
            }
            ApiError::Config(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "configuration error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error",
                    "CONFIG_ERROR",
                )
            }
            ApiError::Serialization(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "serialization error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Serialization error",
                    "SERIALIZATION_ERROR",
                )
            }
            ApiError::Internal(ref msg) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %msg,
                    "internal server error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    msg.as_str(),
                    "INTERNAL_ERROR",
                )
            }
            ApiError::Anyhow(ref err) => {
                tracing::error!(
                    error_id = %error_id,
                    error = %err,
                    "unexpected error occurred"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "INTERNAL_ERROR",
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": error_code,
                "error_id": error_id,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
