//! API error handling
//!
//! Every failure leaving a handler is an [`AppError`]; the response body is
//! always an [`ApiError`]. Internal causes are logged, never returned.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use todo_core::TodoError;
use utoipa::ToSchema;

use crate::auth::repository::RepositoryError;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Individual validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed, missing, or out-of-policy input; carries every reason
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, invalid, or expired credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not entitled to the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(vec![reason.into()])
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Validation(reasons) => {
                ApiError::new("VALIDATION_ERROR", reasons.join("; ")).with_details(reasons)
            }
            AppError::Conflict(msg) => ApiError::new("CONFLICT", msg),
            AppError::Unauthorized(msg) => ApiError::new("UNAUTHORIZED", msg),
            AppError::Forbidden(msg) => ApiError::new("FORBIDDEN", msg),
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::internal_error()
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::EmailAlreadyExists => {
                AppError::Conflict("Email already registered".to_string())
            }
            RepositoryError::UserNotFound => AppError::NotFound("User not found".to_string()),
            RepositoryError::DatabaseError(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TodoError> for AppError {
    fn from(err: TodoError) -> Self {
        match err {
            TodoError::NotFound(msg) => AppError::NotFound(msg),
            TodoError::ValidationError(msg) => AppError::validation(msg),
            TodoError::DatabaseError(msg) => AppError::Internal(msg),
            TodoError::ConfigError(err) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

/// JSON extractor whose rejections are [`AppError::Validation`]
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Path extractor whose rejections are [`AppError::Validation`]
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
