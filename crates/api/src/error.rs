//! Unified error handling for the API.
//!
//! Every failure leaves the server as
//! `{"success": false, "message": "...", "code": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{AuthError, CatalogError, GenerationError, UserError, VoucherError};

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Balance too low to start a generation.
    #[error("Insufficient credits")]
    InsufficientCredits,

    /// Unique constraint or state conflict.
    #[error("{0}")]
    Conflict(String),

    /// LLM call failed during generation.
    #[error("{0}")]
    Generation(String),

    /// Regeneration reply was unusable.
    #[error("{0}")]
    Regeneration(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(RepositoryError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    code: &'static str,
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Generation(_)
            | Self::Regeneration(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InsufficientCredits => "INSUFFICIENT_CREDITS",
            Self::Conflict(_) => "CONFLICT",
            Self::Generation(_) => "GENERATION_FAILED",
            Self::Regeneration(_) => "REGENERATION_FAILED",
            Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message shown to the client.
    fn public_message(&self) -> String {
        match self {
            // Don't expose internal error details to clients
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                code = self.code(),
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let message = self.public_message();
        let body = ErrorBody {
            success: false,
            message: &message,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Conversions from service errors
// =============================================================================

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("Not found".to_string()),
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Database(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidEmail(_) | AuthError::InvalidUsername(_) | AuthError::WeakPassword(_) => {
                Self::BadRequest(err.to_string())
            }
            AuthError::InvalidCredentials => Self::Unauthorized("Invalid credentials".to_string()),
            AuthError::InvalidToken(_) => {
                Self::Unauthorized("Invalid or expired token".to_string())
            }
            AuthError::WrongRole => Self::Forbidden("Access denied".to_string()),
            AuthError::UserAlreadyExists => {
                Self::Conflict("Username or email already registered".to_string())
            }
            AuthError::Repository(e) => e.into(),
            AuthError::PasswordHash => Self::Internal(err.to_string()),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(_) => Self::NotFound(err.to_string()),
            CatalogError::Invalid(msg) => Self::BadRequest(msg),
            CatalogError::Conflict(msg) => Self::Conflict(msg),
            CatalogError::Seed(_) => Self::Internal(err.to_string()),
            CatalogError::Repository(e) => e.into(),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::NotFound(_) => Self::NotFound(err.to_string()),
            GenerationError::Invalid(msg) => Self::BadRequest(msg),
            GenerationError::Llm(_) => Self::Generation(err.to_string()),
            GenerationError::Regeneration(_) => Self::Regeneration(err.to_string()),
            GenerationError::Prompt(_) => Self::Internal(err.to_string()),
            GenerationError::Repository(e) => e.into(),
        }
    }
}

impl From<VoucherError> for AppError {
    fn from(err: VoucherError) -> Self {
        match err {
            VoucherError::NotFound => Self::NotFound("Voucher not found".to_string()),
            VoucherError::CodeSpaceExhausted(_) => Self::Internal(err.to_string()),
            VoucherError::Repository(e) => e.into(),
        }
    }
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => Self::NotFound(err.to_string()),
            UserError::Invalid(msg) => Self::BadRequest(msg),
            UserError::Conflict(msg) => Self::Conflict(msg),
            UserError::Voucher(e) => e.into(),
            UserError::Repository(e) => e.into(),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Internal(format!("session error: {err}"))
    }
}

/// Set the Sentry user context for the authenticated principal.
pub fn set_sentry_user(id: i32, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(id.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[test]
    fn test_status_and_code_table() {
        let cases = [
            (AppError::BadRequest("x".into()), 400, "VALIDATION_ERROR"),
            (AppError::Unauthorized("x".into()), 401, "UNAUTHORIZED"),
            (AppError::InsufficientCredits, 402, "INSUFFICIENT_CREDITS"),
            (AppError::Forbidden("x".into()), 403, "FORBIDDEN"),
            (AppError::NotFound("x".into()), 404, "NOT_FOUND"),
            (AppError::Conflict("x".into()), 409, "CONFLICT"),
            (AppError::Generation("x".into()), 500, "GENERATION_FAILED"),
            (AppError::Regeneration("x".into()), 500, "REGENERATION_FAILED"),
            (AppError::Internal("x".into()), 500, "INTERNAL_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status().as_u16(), status, "{err:?}");
            assert_eq!(err.code(), code);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = body_json(AppError::NotFound("Model not found".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Model not found");
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let (_, body) = body_json(AppError::Database(RepositoryError::DataCorruption(
            "bad row 42".into(),
        )))
        .await;
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body["code"], "INTERNAL_ERROR");
    }

    #[test]
    fn test_generation_errors_map() {
        let err: AppError = GenerationError::NotFound("Model").into();
        assert!(matches!(&err, AppError::NotFound(m) if m == "Model not found"));

        let err: AppError =
            GenerationError::Llm(crate::llm::LlmError::Parse("empty".into())).into();
        assert_eq!(err.code(), "GENERATION_FAILED");
        assert!(err.to_string().starts_with("Generation failed: "));

        let err: AppError = GenerationError::Regeneration("no key".into()).into();
        assert_eq!(err.code(), "REGENERATION_FAILED");
    }

    #[test]
    fn test_auth_errors_map() {
        assert_eq!(AppError::from(AuthError::InvalidCredentials).code(), "UNAUTHORIZED");
        assert_eq!(AppError::from(AuthError::WrongRole).code(), "FORBIDDEN");
        assert_eq!(AppError::from(AuthError::UserAlreadyExists).code(), "CONFLICT");
        assert_eq!(
            AppError::from(AuthError::WeakPassword("short".into())).code(),
            "VALIDATION_ERROR"
        );
    }

    #[test]
    fn test_repository_errors_map() {
        let err: AppError = UserError::from(RepositoryError::Conflict("taken".into())).into();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "taken"));

        assert_eq!(AppError::from(RepositoryError::NotFound).code(), "NOT_FOUND");
        assert_eq!(
            AppError::from(RepositoryError::DataCorruption("x".into())).code(),
            "INTERNAL_ERROR"
        );
    }
}
