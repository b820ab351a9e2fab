//! Error taxonomy shared by the store, the coordinator and the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Error Kinds
// =============================================================================

/// Closed set of failure categories. Every kind maps to exactly one HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthenticated,
    Forbidden,
    NotFound,
    AlreadyExists,
    Internal,
}

impl ErrorKind {
    pub const fn status(self) -> StatusCode {
        match self {
            Self::InvalidArgument => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists => StatusCode::CONFLICT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// =============================================================================
// Error
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self { Self::new(ErrorKind::InvalidArgument, message) }
    pub fn unauthenticated(message: impl Into<String>) -> Self { Self::new(ErrorKind::Unauthenticated, message) }
    pub fn forbidden(message: impl Into<String>) -> Self { Self::new(ErrorKind::Forbidden, message) }
    pub fn not_found(message: impl Into<String>) -> Self { Self::new(ErrorKind::NotFound, message) }
    pub fn already_exists(message: impl Into<String>) -> Self { Self::new(ErrorKind::AlreadyExists, message) }
    pub fn internal(message: impl Into<String>) -> Self { Self::new(ErrorKind::Internal, message) }

    pub fn kind(&self) -> ErrorKind { self.kind }
    pub fn message(&self) -> &str { &self.message }
}

/// Client-facing text for storage failures; the driver error is only logged.
pub const STORAGE_FAILURE: &str = "storage error";

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("record not found"),
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::already_exists(db.message().to_string()),
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                Self::invalid_argument(format!("referenced record does not exist: {}", db.message()))
            }
            sqlx::Error::Database(db) if db.is_check_violation() => Self::invalid_argument(db.message().to_string()),
            _ => {
                tracing::error!(error = %err, "storage error");
                Self::internal(STORAGE_FAILURE)
            }
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::invalid_argument(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::internal(format!("payment gateway request failed: {err}"))
    }
}

// =============================================================================
// HTTP envelope
// =============================================================================

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status_code: u16,
    message: &'a str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        if self.kind == ErrorKind::Internal {
            tracing::error!(error = %self.message, "request failed");
        }
        let body = ErrorBody { status_code: status.as_u16(), message: &self.message };
        (status, Json(body)).into_response()
    }
}
