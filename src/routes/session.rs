//! GET /session and /session/items/{key}

use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::session::SessionError;
use crate::session::middleware::SessionHandle;
use crate::types::SessionResponse;

/// Describe the request's session.
pub async fn current(session: SessionHandle) -> Json<SessionResponse> {
    Json(SessionResponse {
        id: session.id().await,
        expiration: session.expiration().await,
        state: session.state().await,
    })
}

pub async fn get_item(
    session: SessionHandle,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let value = session
        .get(&key)
        .await
        .ok_or(SessionError::NoSuchKey(key))?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], value).into_response())
}

pub async fn put_item(
    session: SessionHandle,
    Path(key): Path<String>,
    body: Bytes,
) -> StatusCode {
    session.set(&key, body.to_vec()).await;
    StatusCode::NO_CONTENT
}

pub async fn delete_item(
    session: SessionHandle,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    session.remove(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}
