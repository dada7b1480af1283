//! Shared response DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::SessionState;

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
}

/// GET /session response.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub expiration: DateTime<Utc>,
    pub state: SessionState,
}
