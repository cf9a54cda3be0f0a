//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and plaintext bodies.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Message returned for every failure the caller cannot act on.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Failure talking to the token store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Query or connection failure reported by sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A record with this token already exists.
    #[error("Duplicate token: {0}")]
    Duplicate(String),

    /// The store did not answer within the configured timeout.
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and plaintext message.
///
/// # Error Categories
///
/// - **Token Errors**: unknown or expired tokens
/// - **File Errors**: the token resolves to nothing servable
/// - **Infrastructure Errors**: store or filesystem failures, never shown to the client
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No record exists for the presented token.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Token not found")]
    TokenNotFound,

    /// The record exists but its `expires_at` has passed.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Token expired")]
    TokenExpired,

    /// The file reference resolved to a missing, non-regular, or out-of-root path.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("File not found")]
    FileNotFound,

    /// Token store failure (connection error, query error, timeout).
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem failure other than a missing file.
    ///
    /// Returns HTTP 500 Internal Server Error.
    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, e.g. a response that could not be assembled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::TokenNotFound | AppError::TokenExpired | AppError::FileNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::Store(_) | AppError::Io(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this error is an infrastructure failure rather than a bad token or file.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Convert AppError into an HTTP response.
///
/// # Status Code Mapping
///
/// - `TokenNotFound` → 404 `Token not found`
/// - `TokenExpired` → 404 `Token expired`
/// - `FileNotFound` → 404 `File not found`
/// - `Store` / `Io` / `Internal` → 500 generic message (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.is_internal() {
            GENERIC_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        (status, message).into_response()
    }
}
