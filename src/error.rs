//! Application error types with Axum response mapping.
//!
//! Each variant maps to a specific HTTP status + JSON body. Storage and
//! session failures that leave the request unserviceable map to 5xx;
//! missing things map to 404.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::account::AccountError;
use crate::session::SessionError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_body(&self) -> (StatusCode, serde_json::Value) {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "Unauthorized"}),
            ),
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({"error": "Not found", "message": what}),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({"error": msg}),
            ),
            AppError::NotImplemented(method) => (
                StatusCode::NOT_IMPLEMENTED,
                json!({"error": "Not implemented", "message": method}),
            ),
            AppError::Session(SessionError::NoSuchKey(key)) => (
                StatusCode::NOT_FOUND,
                json!({"error": "Not found", "message": key}),
            ),
            AppError::Session(SessionError::Storage(e)) | AppError::Storage(e) => storage_status(e),
            AppError::Session(e) if e.is_recoverable() => (
                StatusCode::BAD_REQUEST,
                json!({"error": e.to_string()}),
            ),
            AppError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Session unavailable"}),
            ),
            AppError::Account(AccountError::AccountNotFound(id)) => (
                StatusCode::NOT_FOUND,
                json!({"error": "Not found", "message": id}),
            ),
            AppError::Account(AccountError::ProviderNotFound(name)) => (
                StatusCode::BAD_REQUEST,
                json!({"error": format!("Unknown provider: {name}")}),
            ),
            AppError::Account(AccountError::Invalid(msg)) => (
                StatusCode::BAD_REQUEST,
                json!({"error": msg}),
            ),
            AppError::Account(AccountError::Storage(e)) => storage_status(e),
            AppError::Account(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "Account unavailable"}),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": msg}),
            ),
        }
    }
}

/// Backend details stay in the logs, not the response.
fn storage_status(e: &StorageError) -> (StatusCode, serde_json::Value) {
    match e {
        StorageError::NotFound(key) => (
            StatusCode::NOT_FOUND,
            json!({"error": "Not found", "message": key}),
        ),
        StorageError::InvalidKey(key) => (
            StatusCode::BAD_REQUEST,
            json!({"error": "Invalid key", "message": key}),
        ),
        StorageError::Timeout(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            json!({"error": "Storage timed out"}),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "Storage unavailable"}),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, axum::Json(body)).into_response()
    }
}
