//! Application-wide error handling
//!
//! One error enum for every layer; handlers return `Result<_, AppError>` and
//! the `IntoResponse` impl maps each variant onto the API error contract:
//! 4xx for caller mistakes, 409 for lifecycle conflicts, 5xx for
//! infrastructure, always with a correlation id and a stable error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error response structure for consistent API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    pub message: String,
    pub correlation_id: String,
    pub timestamp: String,
}

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    // Validation errors
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    // Resource errors
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // Domain lifecycle errors
    #[error("Track has no chosen candidate")]
    NoCandidate,

    #[error("Cannot cancel a running download")]
    CancelRunning,

    #[error("A download for this track is already in flight")]
    DownloadInFlight,

    // External provider errors
    #[error("External service error: {service}")]
    ExternalService { service: String, message: String },

    #[error("Provider authorization expired")]
    AuthExpired,

    #[error("Spotify account is not connected")]
    NotConnected,

    // Extractor errors
    #[error("Extractor failed: {0}")]
    Extractor(String),

    // Database errors
    #[error("Database query failed")]
    Database(sqlx::Error),

    #[error("Database constraint violation: {0}")]
    ConstraintViolation(String),

    // System errors
    #[error("Internal server error")]
    Internal { message: Option<String> },
}

impl AppError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: Some(message.into()),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingField { .. } => StatusCode::BAD_REQUEST,

            AppError::NotFound { .. } => StatusCode::NOT_FOUND,

            AppError::Conflict { .. }
            | AppError::CancelRunning
            | AppError::DownloadInFlight
            | AppError::ConstraintViolation(_) => StatusCode::CONFLICT,

            AppError::NoCandidate => StatusCode::UNPROCESSABLE_ENTITY,

            AppError::AuthExpired | AppError::NotConnected => StatusCode::UNAUTHORIZED,

            AppError::ExternalService { .. } | AppError::Extractor(_) => StatusCode::BAD_GATEWAY,

            AppError::Database(_) | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::MissingField { .. } => "MISSING_FIELD",
            AppError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            AppError::Conflict { .. } => "RESOURCE_CONFLICT",
            AppError::NoCandidate => "NO_CANDIDATE",
            AppError::CancelRunning => "CANCEL_RUNNING_REFUSED",
            AppError::DownloadInFlight => "DOWNLOAD_IN_FLIGHT",
            AppError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            AppError::AuthExpired => "PROVIDER_AUTH_EXPIRED",
            AppError::NotConnected => "PROVIDER_NOT_CONNECTED",
            AppError::Extractor(_) => "EXTRACTOR_FAILED",
            AppError::Database(_) => "DATABASE_QUERY_FAILED",
            AppError::ConstraintViolation(_) => "DATABASE_CONSTRAINT_VIOLATION",
            AppError::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    /// User-facing message; never leaks internals for 5xx variants
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal { .. } => {
                "An unexpected error occurred".to_string()
            }
            AppError::Extractor(_) => "The media extractor reported an error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let correlation_id = Uuid::new_v4().to_string();
        let status = self.status_code();
        let error_code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                correlation_id = %correlation_id,
                error_code = %error_code,
                error = %self,
                "Server error occurred"
            );
        } else {
            tracing::info!(
                correlation_id = %correlation_id,
                error_code = %error_code,
                error = %self,
                "Client error occurred"
            );
        }

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            message: self.user_message(),
            correlation_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::ConstraintViolation("unique constraint violation".to_string())
            }
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::ConstraintViolation("foreign key constraint violation".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal {
            message: Some(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: Some(format!("I/O error: {}", err)),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalService {
            service: err
                .url()
                .and_then(|u| u.host_str().map(|h| h.to_string()))
                .unwrap_or_else(|| "http".to_string()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_conflicts_map_to_409() {
        assert_eq!(AppError::CancelRunning.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::DownloadInFlight.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::conflict("duplicate").status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn server_errors_do_not_leak_internals() {
        let err = AppError::internal("secret detail");
        assert_eq!(err.user_message(), "An unexpected error occurred");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn no_candidate_is_unprocessable() {
        assert_eq!(
            AppError::NoCandidate.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::NoCandidate.error_code(), "NO_CANDIDATE");
    }
}
