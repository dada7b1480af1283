//! sitekit: server-side sessions and static pages over pluggable storage.
//!
//! Same Axum router runs in both Lambda and local dev contexts.
//! Detection via `AWS_LAMBDA_RUNTIME_API` env var.

pub mod account;
pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod storage;
pub mod types;
pub mod validation;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::get;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::middleware::checks::{Checks, preliminary_checks};
use crate::session::middleware::{SessionLayer, session_middleware};
use crate::storage::AnyStorage;

/// Shared application state available to all route handlers.
pub struct AppState {
    pub config: Config,
    pub storage: Arc<AnyStorage>,
    pub session_layer: Arc<SessionLayer<AnyStorage>>,
}

impl AppState {
    /// Wire state around an already-built storage backend.
    pub fn new(config: Config, storage: AnyStorage) -> Self {
        let storage = Arc::new(storage);
        let session_layer = Arc::new(SessionLayer::new(
            storage.clone(),
            config.session_options(),
        ));
        Self {
            config,
            storage,
            session_layer,
        }
    }
}

/// Build the Axum router with all middleware and routes.
///
/// Preliminary checks run first so rejected requests never touch session
/// storage. Unmatched paths fall through to the storage-backed pages,
/// which are served without a session.
pub fn create_app(state: Arc<AppState>) -> Router {
    let session_layer = state.session_layer.clone();
    let checks = Arc::new(Checks::from_config(&state.config));

    let session_routes = Router::new()
        .route("/session", get(routes::session::current))
        .route(
            "/session/items/{key}",
            get(routes::session::get_item)
                .put(routes::session::put_item)
                .delete(routes::session::delete_item),
        )
        .layer(from_fn(move |req, next| {
            let layer = session_layer.clone();
            session_middleware(layer, req, next)
        }));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(session_routes)
        .fallback(get(routes::pages::page))
        .layer(from_fn(move |req, next| {
            let checks = checks.clone();
            preliminary_checks(checks, req, next)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
