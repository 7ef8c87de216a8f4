//! Unified error handling with Sentry integration.
//!
//! Every handler and service returns [`Result<T>`]. Errors render as JSON
//! `{"error": ...}` or `{"error": ..., "details": ...}`; server-side failures
//! are captured to Sentry and never leak their internals to the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::payments::PaymentError;
use crate::services::auth::AuthError;

/// Application-level error type for the CRM API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Payment processor could not be reached or rejected the request.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Required input missing or malformed.
    #[error("{error}: {details}")]
    Validation { error: String, details: String },

    /// Input well-formed but naming something that does not exist.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing or invalid bearer token.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid caller, insufficient role or ownership.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request valid but the current state does not allow it.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The processor declined or did not complete a charge.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// A dependent service is not configured.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// A validation error for missing required fields.
    pub fn missing_fields(details: impl Into<String>) -> Self {
        Self::Validation {
            error: "Missing required fields".to_owned(),
            details: details.into(),
        }
    }

    const fn is_server_error(&self) -> bool {
        match self {
            Self::Database(err) => !matches!(
                err,
                RepositoryError::NotFound
                    | RepositoryError::Conflict(_)
                    | RepositoryError::NotAssigned
            ),
            Self::Auth(err) => matches!(
                err,
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::Signing
            ),
            Self::Payment(_) | Self::Internal(_) => true,
            _ => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::NotAssigned => StatusCode::FORBIDDEN,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::Inactive => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists
                | AuthError::WeakPassword(_)
                | AuthError::InvalidEmail(_) => StatusCode::BAD_REQUEST,
                AuthError::Repository(_) | AuthError::PasswordHash | AuthError::Signing => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Validation { .. } | Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `error` string shown to the client.
    fn client_message(&self) -> String {
        if self.is_server_error() {
            return match self {
                Self::Payment(_) => "Payment processor error".to_owned(),
                _ => "Internal server error".to_owned(),
            };
        }

        match self {
            Self::Database(RepositoryError::NotFound) => "Not found".to_owned(),
            Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
            Self::Database(RepositoryError::NotAssigned) => {
                "Not authorized to access this prospect".to_owned()
            }
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials | AuthError::Inactive => {
                    "Invalid credentials".to_owned()
                }
                AuthError::InvalidToken | AuthError::TokenExpired => {
                    "Invalid or expired token".to_owned()
                }
                AuthError::UserAlreadyExists => "Email already exists".to_owned(),
                AuthError::WeakPassword(msg) => msg.clone(),
                _ => "Invalid email address".to_owned(),
            },
            Self::Validation { error, .. } => error.clone(),
            Self::InvalidArgument(msg)
            | Self::Unauthenticated(msg)
            | Self::PermissionDenied(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::FailedPrecondition(msg)
            | Self::PaymentFailed(msg)
            | Self::Unavailable(msg)
            | Self::Internal(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let error = self.client_message();
        let body = match &self {
            Self::Validation { details, .. } => json!({ "error": error, "details": details }),
            _ => json!({ "error": error }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn get_body(err: AppError) -> serde_json::Value {
        let bytes = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("Prospect not found".to_string());
        assert_eq!(err.to_string(), "Not found: Prospect not found");

        let err = AppError::missing_fields("Email is required");
        assert_eq!(
            err.to_string(),
            "Missing required fields: Email is required"
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(AppError::missing_fields("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(AppError::Unauthenticated("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            get_status(AppError::PaymentFailed("x".into())),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            get_status(AppError::PermissionDenied("x".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(AppError::Conflict("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(AppError::FailedPrecondition("x".into())),
            StatusCode::PRECONDITION_FAILED
        );
        assert_eq!(
            get_status(AppError::Unavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(AppError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_repository_errors_map_by_kind() {
        assert_eq!(
            get_status(RepositoryError::NotFound.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(RepositoryError::Conflict("dup".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(RepositoryError::NotAssigned.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            get_status(RepositoryError::DataCorruption("bad".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_body_has_details() {
        let body = get_body(AppError::missing_fields("Email is required")).await;
        assert_eq!(body["error"], "Missing required fields");
        assert_eq!(body["details"], "Email is required");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let body = get_body(AppError::Internal("connection refused at 10.0.0.3".into())).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_message() {
        let body = get_body(AuthError::UserAlreadyExists.into()).await;
        assert_eq!(body["error"], "Email already exists");
    }
}
