//! Axum session middleware layer.
//!
//! Builds a `Manager` per request, loads the session named by the request
//! cookie, hands the manager to route handlers through request extensions
//! and saves it once the handler returns.
//!
//! - `SessionHandle`: shared access to the request's `Manager`
//! - exactly one `Set-Cookie` is appended to successful responses
//! - storage failures during load or save become 5xx responses

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::ops::Deref;
use std::sync::Arc;

use super::{Manager, SessionOptions};
use crate::error::AppError;
use crate::storage::{AnyStorage, Storage};

/// Shared handle to the request's session, inserted into request extensions.
pub struct SessionHandle<S: Storage = AnyStorage>(Arc<Manager<S>>);

impl<S: Storage> Clone for SessionHandle<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<S: Storage> Deref for SessionHandle<S> {
    type Target = Manager<S>;

    fn deref(&self) -> &Manager<S> {
        &self.0
    }
}

/// Extract SessionHandle from request extensions (put there by session middleware).
impl<S, St> FromRequestParts<St> for SessionHandle<S>
where
    S: Storage + 'static,
    St: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle<S>>()
            .cloned()
            .ok_or(AppError::Internal(
                "Session middleware not configured".into(),
            ))
    }
}

/// Session middleware configuration.
pub struct SessionLayer<S: Storage> {
    pub storage: Arc<S>,
    pub options: SessionOptions,
}

impl<S: Storage> SessionLayer<S> {
    pub fn new(storage: Arc<S>, options: SessionOptions) -> Self {
        Self { storage, options }
    }
}

/// Axum middleware function for session handling.
pub async fn session_middleware<S: Storage + 'static>(
    layer: Arc<SessionLayer<S>>,
    mut req: Request,
    next: Next,
) -> Response {
    let manager = Arc::new(Manager::new(layer.storage.clone(), layer.options.clone()));

    let cookie = match manager.load(req.headers()).await {
        Ok(cookie) => cookie,
        Err(e) => {
            tracing::error!("Could not load session: {}", e);
            return AppError::Session(e).into_response();
        }
    };

    req.extensions_mut().insert(SessionHandle(manager.clone()));

    let mut response = next.run(req).await;

    if let Err(e) = manager.save().await {
        tracing::error!("Could not save session {}: {}", cookie.value, e);
        return AppError::Session(e).into_response();
    }

    match HeaderValue::from_str(&cookie.to_header_value()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!("Session cookie is not a valid header value: {}", e),
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::COOKIE_NAME;
    use crate::storage::memory::MemoryStorage;
    use axum::Router;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(storage: Arc<MemoryStorage>) -> Router {
        let layer = Arc::new(SessionLayer::new(storage, SessionOptions::default()));
        Router::new()
            .route(
                "/write",
                get(|session: SessionHandle<MemoryStorage>| async move {
                    session.set("visited", "yes").await;
                    StatusCode::OK
                }),
            )
            .route(
                "/read",
                get(|session: SessionHandle<MemoryStorage>| async move {
                    let value = session.get("visited").await.unwrap_or_default();
                    String::from_utf8_lossy(&value).into_owned()
                }),
            )
            .layer(from_fn(move |req, next| {
                let layer = layer.clone();
                session_middleware(layer, req, next)
            }))
    }

    fn session_value(response: &Response) -> String {
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1, "exactly one Set-Cookie");
        let raw = cookies[0].to_str().unwrap();
        raw.split(';')
            .next()
            .and_then(|kv| kv.strip_prefix(&format!("{COOKIE_NAME}=")))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_session_persists_across_requests() {
        let storage = Arc::new(MemoryStorage::new());
        let app = app(storage.clone());

        let response = app
            .clone()
            .oneshot(axum::http::Request::get("/write").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sid = session_value(&response);
        assert_eq!(storage.len(), 1);

        let response = app
            .oneshot(
                axum::http::Request::get("/read")
                    .header(header::COOKIE, format!("{COOKIE_NAME}={sid}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(session_value(&response), sid);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"yes");
    }

    #[tokio::test]
    async fn test_untouched_session_is_not_stored() {
        let storage = Arc::new(MemoryStorage::new());
        let response = app(storage.clone())
            .oneshot(axum::http::Request::get("/read").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(session_value(&response).len(), 36);
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_internal_error() {
        let app = Router::new().route(
            "/",
            get(|_session: SessionHandle<MemoryStorage>| async { StatusCode::OK }),
        );
        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
