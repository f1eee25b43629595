//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use doorman_proxy_core::{AuthError, EventError, StoreError};
use tracing::{error, warn};

/// Handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: the notification was rejected by validation
/// - `401 Unauthorized`: the authentication gate denied the request
/// - `404 Not Found`: no release is waiting
/// - `500 Internal Server Error`: the configuration source failed
///
/// Store failures are logged in full server-side; the client only sees the
/// operation that failed.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Notification payload failed parsing or validation
    #[error("{0}")]
    InvalidEvent(#[from] EventError),

    /// Configuration source could not complete the operation
    #[error("{operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// Release queue is empty
    #[error("No release available")]
    NoRelease,

    /// Authentication gate denied the request
    #[error("Unauthorized")]
    Unauthorized(#[from] AuthError),

    /// Response could not be serialized
    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl HandlerError {
    pub fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InvalidEvent(ref e) => {
                warn!(error = %e, "Rejected event notification");
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            Self::Store {
                operation,
                ref source,
            } => {
                error!(
                    error = %source,
                    unavailable = source.is_unavailable(),
                    operation,
                    "Configuration source operation failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, operation.to_string())
            }
            Self::NoRelease => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::InternalError { ref message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error occurred".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid path pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
