//! Fallback: static pages served from storage.

use axum::extract::State;
use axum::http::{Uri, header};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use crate::error::AppError;
use crate::storage::{Storage, StorageError, join_key};

const INDEX_PAGE: &str = "index.html";

/// Storage key for a request path under `location`; directories map to
/// their `index.html`.
pub fn page_key(location: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    let page = if path.is_empty() {
        INDEX_PAGE.to_string()
    } else if path.ends_with('/') {
        format!("{path}{INDEX_PAGE}")
    } else {
        path.to_string()
    };
    join_key(location, &page)
}

/// Content type by file extension.
pub fn content_type(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "css" => "text/css; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "png" => "image/png",
        "svg" | "svgz" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// GET fallback: load the requested page from storage.
pub async fn page(
    State(state): State<Arc<crate::AppState>>,
    uri: Uri,
) -> Result<Response, AppError> {
    let key = page_key(&state.config.pages_location, uri.path());

    let body = state.storage.load(&key).await.map_err(|e| match e {
        StorageError::NotFound(_) | StorageError::InvalidKey(_) => {
            tracing::debug!("no page at {}", key);
            AppError::NotFound(uri.path().to_string())
        }
        other => {
            tracing::error!("could not load page {}: {}", key, other);
            AppError::Storage(other)
        }
    })?;

    Ok(([(header::CONTENT_TYPE, content_type(&key))], body).into_response())
}
