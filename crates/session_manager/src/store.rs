//! In-memory session store with per-user locking

use crate::error::{Result, SessionError};
use crate::storage::SessionStorage;
use crate::structs::UserSession;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Exclusive handle on one user's session.
///
/// Holding the lock for a whole message keeps concurrent messages of the same
/// user from observing a half-updated session.
pub type SessionHandle = Arc<Mutex<UserSession>>;

/// Sharded user-id -> session map.
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    storage: Option<Arc<dyn SessionStorage>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            storage: None,
        }
    }

    /// Mirror sessions to `storage`
    pub fn with_storage(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            sessions: DashMap::new(),
            storage: Some(storage),
        }
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }

    /// Get the user's session, loading it from storage or creating it at
    /// `initial_state` when unknown.
    pub async fn get_or_create(&self, user_id: &str, initial_state: &str) -> Result<SessionHandle> {
        if let Some(handle) = self.get(user_id) {
            return Ok(handle);
        }

        let session = match &self.storage {
            Some(storage) => match storage.load_session(user_id).await {
                Ok(session) => {
                    debug!("[{}] Session restored from storage", user_id);
                    session
                }
                Err(SessionError::NotFound) => UserSession::new(user_id, initial_state),
                Err(e) => return Err(e),
            },
            None => UserSession::new(user_id, initial_state),
        };

        // Another message for the same user may have raced us here; first insert wins.
        let handle = self
            .sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!("[{}] Session created in state '{}'", user_id, session.state);
                Arc::new(Mutex::new(session))
            })
            .clone();

        Ok(handle)
    }

    /// Lock the user's live session, creating it when unknown.
    ///
    /// The sweep may evict a session between fetching its handle and locking
    /// it; the returned guard always belongs to the session currently mapped
    /// to `user_id`.
    pub async fn lock_session(
        &self,
        user_id: &str,
        initial_state: &str,
    ) -> Result<OwnedMutexGuard<UserSession>> {
        let handle = self.get_or_create(user_id, initial_state).await?;
        self.lock_live(user_id, handle, initial_state).await
    }

    async fn lock_live(
        &self,
        user_id: &str,
        mut handle: SessionHandle,
        initial_state: &str,
    ) -> Result<OwnedMutexGuard<UserSession>> {
        loop {
            let guard = Arc::clone(&handle).lock_owned().await;
            let live = self
                .get(user_id)
                .is_some_and(|current| Arc::ptr_eq(&current, &handle));
            if live {
                return Ok(guard);
            }

            debug!("[{}] Session evicted while waiting for its lock", user_id);
            drop(guard);
            handle = self.get_or_create(user_id, initial_state).await?;
        }
    }

    pub fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.get(user_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Clone of the user's current session
    pub async fn snapshot(&self, user_id: &str) -> Option<UserSession> {
        let handle = self.get(user_id)?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Write `session` through to storage, if configured
    pub async fn persist(&self, session: &UserSession) -> Result<()> {
        match &self.storage {
            Some(storage) => storage.save_session(&session.user_id, session).await,
            None => Ok(()),
        }
    }

    /// Drop a session from memory and storage
    pub async fn remove(&self, user_id: &str) -> Result<bool> {
        let removed = self.sessions.remove(user_id).is_some();
        if let Some(storage) = &self.storage {
            storage.delete_session(user_id).await?;
        }
        Ok(removed)
    }

    /// Remove every session idle for longer than `timeout` at `now`.
    ///
    /// Sessions currently locked by an in-flight message are in use and kept.
    pub fn evict_expired_at(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.sessions.retain(|user_id, handle| {
            let expired = match handle.try_lock() {
                Ok(session) => session.is_expired(now, timeout),
                Err(_) => false,
            };
            if expired {
                evicted.push(user_id.clone());
            }
            !expired
        });
        evicted
    }

    /// Evict expired sessions now and delete them from storage.
    pub async fn sweep(&self, timeout: Duration) -> usize {
        let evicted = self.evict_expired_at(Utc::now(), timeout);

        if let Some(storage) = &self.storage {
            for user_id in &evicted {
                if let Err(e) = storage.delete_session(user_id).await {
                    warn!("[{}] Failed to delete expired session: {}", user_id, e);
                }
            }
        }

        if !evicted.is_empty() {
            debug!("Evicted {} expired sessions", evicted.len());
        }
        evicted.len()
    }

    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
