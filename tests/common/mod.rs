//! Test utilities: app builders, request helpers, session seeding.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use serde_json::Value;
use sitekit::config::Config;
use sitekit::session::{COOKIE_NAME, SessionData};
use sitekit::storage::memory::MemoryStorage;
use sitekit::storage::{AnyStorage, Storage};
use sitekit::{AppState, create_app};
use std::sync::Arc;

/// Build a test app over in-memory storage with the default test config.
pub fn build_test_app() -> (Router, Arc<AppState>) {
    build_test_app_with_config(Config::test_default())
}

/// Build a test app over in-memory storage with a custom config.
pub fn build_test_app_with_config(config: Config) -> (Router, Arc<AppState>) {
    build_test_app_with_storage(config, AnyStorage::Memory(MemoryStorage::new()))
}

pub fn build_test_app_with_storage(config: Config, storage: AnyStorage) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config, storage));
    let app = create_app(state.clone());
    (app, state)
}

/// Store a session record where the session middleware will look for it.
pub async fn seed_session(state: &AppState, data: &SessionData) {
    let key = state.config.session_options().storage_key(&data.id);
    state
        .storage
        .save(&key, &serde_json::to_vec(data).unwrap())
        .await
        .unwrap();
}

pub async fn load_session(state: &AppState, id: &str) -> Option<SessionData> {
    let key = state.config.session_options().storage_key(id);
    let bytes = state.storage.load(&key).await.ok()?;
    Some(serde_json::from_slice(&bytes).unwrap())
}

/// Build a request carrying a session cookie.
pub fn request_with_session(method: &str, uri: &str, session_id: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("{COOKIE_NAME}={session_id}"))
        .body(Body::empty())
        .unwrap()
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Every `Set-Cookie` value on a response.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the single session cookie set on a response.
pub fn session_cookie_value(response: &Response) -> String {
    let cookies = set_cookies(response);
    assert_eq!(cookies.len(), 1, "expected exactly one Set-Cookie: {cookies:?}");
    cookies[0]
        .split(';')
        .next()
        .and_then(|kv| kv.strip_prefix(&format!("{COOKIE_NAME}=")))
        .expect("session cookie")
        .to_string()
}

/// Helper to read response body as JSON.
pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}
