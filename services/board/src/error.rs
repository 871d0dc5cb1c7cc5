//! Custom error types for the job board

use auth::{AuthError, ResetError, session::SessionError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::RepositoryError;
use serde_json::json;
use thiserror::Error;

use crate::upload::UploadError;

/// Error type returned by request handlers
#[derive(Error, Debug)]
pub enum AppError {
    /// Form input was rejected; every message is shown next to the form
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Authentication(String),

    #[error("You are not allowed to do that")]
    Forbidden,

    #[error("Page not found")]
    NotFound,

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Upload(e) if e.is_user_facing() => StatusCode::BAD_REQUEST,
            AppError::Upload(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => AppError::NotFound,
            other => AppError::Internal(other.into()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        if e.is_user_facing() {
            AppError::Authentication(e.to_string())
        } else {
            AppError::Internal(e.into())
        }
    }
}

impl From<ResetError> for AppError {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::InvalidPassword(message) => AppError::Validation(vec![message]),
            e if e.is_user_facing() => AppError::Authentication(e.to_string()),
            e => AppError::Internal(e.into()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Internal(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!("Unhandled error: {:#}", e);
                json!({ "message": "Internal server error", "status": status.as_u16() })
            }
            AppError::Upload(e) if !e.is_user_facing() => {
                tracing::error!("Upload failed: {}", e);
                json!({ "message": "Internal server error", "status": status.as_u16() })
            }
            AppError::Validation(messages) => json!({
                "message": "Validation failed",
                "errors": messages,
                "status": status.as_u16(),
            }),
            other => json!({ "message": other.to_string(), "status": status.as_u16() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Type alias for handler results
pub type AppResult<T> = Result<T, AppError>;
