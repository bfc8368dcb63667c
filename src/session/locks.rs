//! Per-session single-writer locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

struct Slot {
    lock: Arc<Mutex<()>>,
    /// When the engine last took this lock to handle an event.
    last_event: Option<Instant>,
}

impl Slot {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            last_event: None,
        }
    }
}

/// Serializes event handling per session id while leaving distinct sessions
/// fully concurrent. Also remembers when each session last saw an event, since
/// rejected inputs and failed submits leave the stored session untouched.
#[derive(Default)]
pub struct SessionLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait for exclusive access to `session_id` on behalf of an inbound
    /// event. Access is released when the guard drops.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.lock(session_id, true).await
    }

    /// Wait for exclusive access without counting as user activity.
    pub async fn acquire_quiet(&self, session_id: &str) -> OwnedMutexGuard<()> {
        self.lock(session_id, false).await
    }

    async fn lock(&self, session_id: &str, activity: bool) -> OwnedMutexGuard<()> {
        let lock = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(session_id.to_string()).or_insert_with(Slot::new);
            if activity {
                slot.last_event = Some(Instant::now());
            }
            Arc::clone(&slot.lock)
        };
        lock.lock_owned().await
    }

    /// Whether an event for `session_id` arrived within `window`.
    pub async fn active_within(&self, session_id: &str, window: Duration) -> bool {
        self.slots
            .lock()
            .await
            .get(session_id)
            .and_then(|slot| slot.last_event)
            .is_some_and(|at| at.elapsed() <= window)
    }

    /// Drop locks nobody holds or waits on and that saw no event within
    /// `keep_active`.
    pub async fn prune(&self, keep_active: Duration) {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| {
            Arc::strong_count(&slot.lock) > 1
                || slot.last_event.is_some_and(|at| at.elapsed() <= keep_active)
        });
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
