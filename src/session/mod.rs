//! Server-side session management.
//!
//! A session is an opaque ID carried in the `_sid_` cookie plus a record
//! persisted through any `Storage` backend. The `Manager` issues, restores,
//! extends and invalidates sessions; the middleware wires one manager into
//! every request.

pub mod cookie;
pub mod manager;
pub mod middleware;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::storage::StorageError;

pub use manager::Manager;

/// Cookie name carrying the session ID.
pub const COOKIE_NAME: &str = "_sid_";

/// Remaining lifetime below which a restored session is extended.
pub const LOW_WATER_MARK: Duration = Duration::from_secs(5 * 60);

/// How far a session is extended when it is restored near expiry.
pub const EXTEND_BY: Duration = Duration::from_secs(5 * 60);

const MAX_ID_LEN: usize = 128;

/// Session record persisted in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub id: String,
    pub expiration: DateTime<Utc>,
    /// Arbitrary caller payloads, base64 encoded in JSON.
    #[serde(default, with = "base64_items")]
    pub items: HashMap<String, Vec<u8>>,
}

impl SessionData {
    /// A new, empty session that expires `ttl` from now.
    pub fn new(ttl: Duration) -> Self {
        Self {
            id: generate_id(),
            expiration: Utc::now()
                .checked_add_signed(to_delta(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            items: HashMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }
}

/// Convert a std duration, saturating at ten thousand years.
pub(crate) fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or_else(|_| TimeDelta::days(3_650_000))
}

/// A globally unique, time-ordered session ID (UUID v7).
///
/// Panics if the operating system's random source is unavailable; a
/// session cannot be issued without it.
pub fn generate_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Whether `id` is safe to use as a storage key segment.
pub fn is_well_formed_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Lifecycle of the session held by a `Manager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, `load` not yet called.
    Uninitialized,
    /// Newly issued, never persisted.
    Fresh,
    /// Loaded from storage.
    Restored,
    /// Loaded from storage and its expiration pushed forward.
    Extended,
    /// The presented cookie did not match the stored record.
    Invalid,
    /// Written to storage.
    Persisted,
}

/// Per-deployment session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub ttl: Duration,
    /// Storage prefix for session records; empty for none.
    pub location: String,
    /// Appended to the record key, e.g. `.json`.
    pub suffix: String,
    pub cookie_path: String,
    pub cookie_domain: Option<String>,
    pub extend_by: Duration,
    pub low_water_mark: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(20 * 60),
            location: String::new(),
            suffix: String::new(),
            cookie_path: "/".into(),
            cookie_domain: None,
            extend_by: EXTEND_BY,
            low_water_mark: LOW_WATER_MARK,
        }
    }
}

impl SessionOptions {
    /// Storage key for a session record: `<location>/<id><suffix>`.
    pub fn storage_key(&self, id: &str) -> String {
        crate::storage::join_key(&self.location, &format!("{id}{}", self.suffix))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session ID is empty")]
    EmptySessionId,

    #[error("session ID {0:?} is malformed")]
    MalformedId(String),

    #[error("storage has not been set")]
    NoStorageConfigured,

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session has expired at {}", .expiration.to_rfc3339())]
    Expired { expiration: DateTime<Utc> },

    #[error("could not decode session record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("could not encode session record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("the key {0} was not found in the session")]
    NoSuchKey(String),

    #[error(transparent)]
    Storage(StorageError),
}

impl SessionError {
    /// Conditions after which the request continues with a fresh session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::EmptySessionId
                | SessionError::MalformedId(_)
                | SessionError::NotFound(_)
                | SessionError::Expired { .. }
                | SessionError::Decode(_)
        )
    }
}

/// Serde adapter storing item values as standard base64 strings.
mod base64_items {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S: Serializer>(
        items: &HashMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: HashMap<&str, String> = items
            .iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, Vec<u8>>, D::Error> {
        let encoded = HashMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| STANDARD.decode(v).map(|bytes| (k, bytes)).map_err(D::Error::custom))
            .collect()
    }
}
