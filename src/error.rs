// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::db::StoreError;
use crate::services::admin::AdminError;
use crate::services::identity::IdentityError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures of the session operations. Provider messages are shown to the
/// end user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(IdentityError),

    #[error("{0}")]
    ProviderLogin(IdentityError),

    #[error("{0}")]
    Registration(IdentityError),

    #[error("{0}")]
    Reset(IdentityError),

    #[error("Profile store unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Login failed: {message}")]
    LoginFailed {
        message: String,
        reset_suggested: bool,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    #[error("Partial approval: {0}")]
    PartialApproval(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reset_suggested: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut reset_suggested = false;
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                Some(errors.to_string()),
            ),
            AppError::LoginFailed {
                message,
                reset_suggested: suggested,
            } => {
                reset_suggested = *suggested;
                (StatusCode::UNAUTHORIZED, "login_failed", Some(message.clone()))
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::IdentityProvider(msg) => {
                (StatusCode::BAD_REQUEST, "identity_error", Some(msg.clone()))
            }
            AppError::PartialApproval(msg) => {
                tracing::error!(error = %msg, "Approval left inconsistent documents");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "partial_approval",
                    Some(msg.clone()),
                )
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            reset_suggested,
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{}/{}", collection, id))
            }
            StoreError::Unavailable(msg) => AppError::Database(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(e) => AppError::LoginFailed {
                message: e.to_string(),
                reset_suggested: false,
            },
            AuthError::ProviderLogin(e) | AuthError::Registration(e) | AuthError::Reset(e) => {
                match e {
                    IdentityError::EmailInUse => AppError::Conflict(e.to_string()),
                    IdentityError::Transport(msg) => {
                        AppError::Internal(anyhow::anyhow!("identity provider: {}", msg))
                    }
                    other => AppError::IdentityProvider(other.to_string()),
                }
            }
            AuthError::StorageUnavailable(e) => e.into(),
        }
    }
}

impl From<AdminError> for AppError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::NotFound(what) => AppError::NotFound(what),
            AdminError::LastAdmin => AppError::Conflict(err.to_string()),
            AdminError::PartialApprovalFailure { .. } => AppError::PartialApproval(err.to_string()),
            AdminError::Storage(e) => e.into(),
            AdminError::Reset(e) => AuthError::Reset(e).into(),
            AdminError::Internal(e) => AppError::Internal(e),
        }
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
