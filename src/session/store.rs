//! Session store abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;

use super::locks::SessionLocks;
use super::model::Session;

/// Keyed session persistence. `get` and `put` are atomic per key.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session, or `None` if the user has none.
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Insert or replace a session.
    async fn put(&self, session: &Session) -> Result<(), StoreError>;

    /// Remove a session. Returns whether one existed.
    async fn clear(&self, session_id: &str) -> Result<bool, StoreError>;

    /// Ids of sessions not updated for longer than `max_idle`. Nothing is
    /// removed; see [`sweep_idle`].
    async fn idle_sessions(&self, max_idle: Duration) -> Result<Vec<String>, StoreError>;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn put(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn idle_sessions(&self, max_idle: Duration) -> Result<Vec<String>, StoreError> {
        let max_idle = idle_window(max_idle)?;
        let now = Utc::now();
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_idle(max_idle, now))
            .map(|s| s.session_id.clone())
            .collect())
    }
}

pub(crate) fn idle_window(max_idle: Duration) -> Result<chrono::Duration, StoreError> {
    chrono::Duration::from_std(max_idle)
        .map_err(|e| StoreError::Query(format!("idle timeout out of range: {e}")))
}

/// Remove sessions idle for longer than `max_idle`, returning their ids.
///
/// Each candidate is re-checked under its session lock, so a session whose
/// event is being handled is never removed mid-flight, and a session that saw
/// any event within `max_idle` survives even if it was not rewritten.
pub async fn sweep_idle(
    store: &dyn SessionStore,
    locks: &SessionLocks,
    max_idle: Duration,
) -> Result<Vec<String>, StoreError> {
    let window = idle_window(max_idle)?;
    let mut expired = Vec::new();

    for id in store.idle_sessions(max_idle).await? {
        let _guard = locks.acquire_quiet(&id).await;
        if locks.active_within(&id, max_idle).await {
            continue;
        }
        let still_idle = store
            .get(&id)
            .await?
            .is_some_and(|s| s.is_idle(window, Utc::now()));
        if still_idle && store.clear(&id).await? {
            debug!(session = %id, "Session expired");
            expired.push(id);
        }
    }
    Ok(expired)
}

/// Spawn a background task that periodically drops idle sessions and their
/// locks.
pub fn spawn_sweep_task(
    store: Arc<dyn SessionStore>,
    locks: Arc<SessionLocks>,
    max_idle: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match sweep_idle(store.as_ref(), &locks, max_idle).await {
                Ok(expired) => {
                    if !expired.is_empty() {
                        info!(count = expired.len(), "Expired idle sessions");
                    }
                }
                Err(e) => warn!("Session sweep failed: {e}"),
            }
            locks.prune(max_idle).await;
        }
    })
}
