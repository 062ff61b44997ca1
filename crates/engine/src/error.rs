//! Error types for the Weft engine.
//!
//! `AppError` implements `IntoResponse` so handlers can return it directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use weft_steps::StepError;

use crate::hil::NotifyError;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No executor registered for a step kind
    #[error("Unknown step kind: {0}")]
    UnknownStepKind(String),

    /// Resume data does not satisfy the pause's resume conditions
    #[error("Resume condition not met: {0}")]
    ConditionNotMet(String),

    /// An execution already has an active pause
    #[error("Duplicate suspension: {0}")]
    DuplicateSuspension(String),

    /// Conflict error (e.g., state changed concurrently)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Notification channel error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::UnknownStepKind(kind) => {
                (StatusCode::BAD_REQUEST, format!("Unknown step kind: {}", kind))
            }
            AppError::ConditionNotMet(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::DuplicateSuspension(msg) => {
                tracing::error!(error = %msg, "Duplicate suspension");
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Notification(msg) => {
                tracing::warn!(error = %msg, "Notification error");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "Serialization error");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Config(msg) => {
                tracing::error!(error = %msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<StepError> for AppError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::UnknownStepKind(kind) => AppError::UnknownStepKind(kind),
            StepError::Validation(msg) => AppError::Validation(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        AppError::Notification(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<envy::Error> for AppError {
    fn from(err: envy::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Validation(format!("invalid workflow definition: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = AppError::NotFound("no active pause for execution ex-1".to_string());
        assert_eq!(
            err.to_string(),
            "Resource not found: no active pause for execution ex-1"
        );
    }

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::ConditionNotMet("x".into()), StatusCode::CONFLICT),
            (AppError::DuplicateSuspension("x".into()), StatusCode::CONFLICT),
            (AppError::UnknownStepKind("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_from_step_error() {
        let err: AppError = StepError::UnknownStepKind("teleport".into()).into();
        assert!(matches!(err, AppError::UnknownStepKind(k) if k == "teleport"));

        let err: AppError = StepError::Execution("boom".into()).into();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn test_from_notify_error() {
        let err: AppError = NotifyError::UnknownChannel("pager".into()).into();
        assert!(matches!(&err, AppError::Notification(msg) if msg.contains("pager")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
