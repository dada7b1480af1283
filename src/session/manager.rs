//! Session manager: issue, restore, extend, invalidate and persist.
//!
//! One `Manager` serves one request. Its session state sits behind a
//! `tokio::sync::Mutex` so handlers sharing the manager through
//! `SessionHandle` see each other's writes, and `save` cannot interleave
//! with `set`/`remove`.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::cookie::{SessionCookie, find_cookie};
use super::{
    COOKIE_NAME, SessionData, SessionError, SessionOptions, SessionState, is_well_formed_id,
    to_delta,
};
use crate::audit;
use crate::storage::Storage;

struct Inner {
    data: SessionData,
    /// Set by mutations; `save` is a no-op while false.
    dirty: bool,
    state: SessionState,
}

pub struct Manager<S: Storage> {
    storage: Option<Arc<S>>,
    options: SessionOptions,
    inner: Mutex<Inner>,
}

impl<S: Storage> Manager<S> {
    /// A manager holding a new, unsaved session.
    pub fn new(storage: Arc<S>, options: SessionOptions) -> Self {
        Self::build(Some(storage), options)
    }

    /// A manager without a backend. `restore` and `save` fail with
    /// `NoStorageConfigured`.
    pub fn detached(options: SessionOptions) -> Self {
        Self::build(None, options)
    }

    fn build(storage: Option<Arc<S>>, options: SessionOptions) -> Self {
        let data = SessionData::new(options.ttl);
        Self {
            storage,
            options,
            inner: Mutex::new(Inner {
                data,
                dirty: false,
                state: SessionState::Uninitialized,
            }),
        }
    }

    pub async fn id(&self) -> String {
        self.inner.lock().await.data.id.clone()
    }

    pub async fn expiration(&self) -> DateTime<Utc> {
        self.inner.lock().await.data.expiration
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_dirty(&self) -> bool {
        self.inner.lock().await.dirty
    }

    /// Copy of the in-memory record.
    pub async fn data(&self) -> SessionData {
        self.inner.lock().await.data.clone()
    }

    /// The session ID cookie for the current session.
    pub async fn id_cookie(&self) -> SessionCookie {
        let inner = self.inner.lock().await;
        self.cookie_for(&inner.data.id, inner.data.expiration)
    }

    fn cookie_for(&self, id: &str, expires: DateTime<Utc>) -> SessionCookie {
        SessionCookie::new(
            id,
            &self.options.cookie_path,
            self.options.cookie_domain.as_deref(),
            expires,
        )
    }

    /// Begin a new session or restore the one named by the request's
    /// session cookie. Returns the cookie to send back.
    ///
    /// A missing, unknown, expired or undecodable session yields a fresh
    /// session. A stored record whose ID differs from the cookie is treated
    /// as tampering: the returned cookie expires immediately and the
    /// in-memory session is replaced by an empty one. Only storage and
    /// configuration failures are returned as errors.
    pub async fn load(&self, headers: &HeaderMap) -> Result<SessionCookie, SessionError> {
        let presented = find_cookie(headers, COOKIE_NAME)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let Some(presented) = presented else {
            let mut inner = self.inner.lock().await;
            inner.state = SessionState::Fresh;
            tracing::info!("setting a session ID cookie now");
            audit::session_event(
                audit::ACTIVITY_ISSUED,
                audit::STATUS_SUCCESS,
                audit::SEVERITY_INFORMATIONAL,
                Some(&inner.data.id),
                "new session issued",
            );
            return Ok(self.cookie_for(&inner.data.id, inner.data.expiration));
        };

        match self.restore(&presented).await {
            Ok(()) => {}
            Err(e) if e.is_recoverable() => {
                let severity = if matches!(e, SessionError::Decode(_)) {
                    tracing::error!("Session {} is corrupt: {}", presented, e);
                    audit::SEVERITY_MEDIUM
                } else {
                    tracing::info!("Session {} not restored: {}", presented, e);
                    audit::SEVERITY_LOW
                };
                audit::session_event(
                    audit::ACTIVITY_REJECTED,
                    audit::STATUS_FAILURE,
                    severity,
                    None,
                    &e.to_string(),
                );

                let mut inner = self.inner.lock().await;
                inner.data = SessionData::new(self.options.ttl);
                inner.dirty = false;
                inner.state = SessionState::Fresh;
                return Ok(self.cookie_for(&inner.data.id, inner.data.expiration));
            }
            Err(e) => return Err(e),
        }

        let mut inner = self.inner.lock().await;
        if inner.data.id != presented {
            tracing::error!(
                "strangeness detected, the session is out of sync. expiring the current session cookie"
            );
            audit::session_event(
                audit::ACTIVITY_INVALIDATED,
                audit::STATUS_FAILURE,
                audit::SEVERITY_HIGH,
                Some(&presented),
                "session cookie does not match the stored session",
            );

            inner.data = SessionData::new(self.options.ttl);
            inner.dirty = false;
            inner.state = SessionState::Invalid;
            return Ok(self.cookie_for(&presented, Utc::now()));
        }

        audit::session_event(
            if inner.state == SessionState::Extended {
                audit::ACTIVITY_EXTENDED
            } else {
                audit::ACTIVITY_RESTORED
            },
            audit::STATUS_SUCCESS,
            audit::SEVERITY_INFORMATIONAL,
            Some(&inner.data.id),
            "session restored",
        );
        Ok(self.cookie_for(&inner.data.id, inner.data.expiration))
    }

    /// Replace the in-memory session with the stored record for `id`.
    ///
    /// A record with less than `low_water_mark` left is extended by
    /// `extend_by` and marked dirty so the new expiration is persisted.
    /// On any error the in-memory session is left untouched.
    pub async fn restore(&self, id: &str) -> Result<(), SessionError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SessionError::EmptySessionId);
        }
        let storage = self
            .storage
            .as_ref()
            .ok_or(SessionError::NoStorageConfigured)?;
        if !is_well_formed_id(id) {
            return Err(SessionError::MalformedId(id.to_string()));
        }

        let bytes = storage
            .load(&self.options.storage_key(id))
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    SessionError::NotFound(id.to_string())
                } else {
                    SessionError::Storage(e)
                }
            })?;

        let mut data: SessionData = serde_json::from_slice(&bytes).map_err(SessionError::Decode)?;

        let now = Utc::now();
        if data.is_expired(now) {
            return Err(SessionError::Expired {
                expiration: data.expiration,
            });
        }

        let mut state = SessionState::Restored;
        let mut dirty = false;
        tracing::debug!("session {} expires at {}", data.id, data.expiration.format("%H:%M:%S"));
        if data.expiration - now < to_delta(self.options.low_water_mark) {
            data.expiration += to_delta(self.options.extend_by);
            state = SessionState::Extended;
            dirty = true;
            tracing::debug!("session {} extended to {}", data.id, data.expiration.format("%H:%M:%S"));
        }

        let mut inner = self.inner.lock().await;
        inner.data = data;
        inner.dirty = dirty;
        inner.state = state;
        tracing::info!("session restored");
        Ok(())
    }

    /// Item stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().await.data.items.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: impl Into<Vec<u8>>) {
        let mut inner = self.inner.lock().await;
        inner.data.items.insert(key.to_string(), value.into());
        inner.dirty = true;
    }

    pub async fn remove(&self, key: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.data.items.remove(key).is_none() {
            return Err(SessionError::NoSuchKey(key.to_string()));
        }
        inner.dirty = true;
        Ok(())
    }

    /// Drop every item in the session.
    pub async fn remove_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.data.items.clear();
        inner.dirty = true;
    }

    /// Write the session to storage. No-op unless something changed since
    /// the last load or save, and always a no-op for an invalidated
    /// session: its replacement ID was never sent to the client.
    pub async fn save(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.dirty {
            return Ok(());
        }
        if inner.state == SessionState::Invalid {
            tracing::warn!("discarding writes to invalidated session {}", inner.data.id);
            return Ok(());
        }

        let storage = self
            .storage
            .as_ref()
            .ok_or(SessionError::NoStorageConfigured)?;
        let bytes = serde_json::to_vec(&inner.data).map_err(SessionError::Encode)?;
        let key = self.options.storage_key(&inner.data.id);

        storage
            .save(&key, &bytes)
            .await
            .map_err(SessionError::Storage)?;

        inner.dirty = false;
        inner.state = SessionState::Persisted;
        tracing::debug!("session saved to {}", storage.location(&key));
        Ok(())
    }
}
