//! Per-session mutual exclusion for chat turns.
//!
//! A chat turn holds its session's lock from the first read to the last
//! append, so two messages for the same session never interleave. Different
//! sessions never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use supportline_core::session::SessionId;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Lock entries are pruned once the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

type SessionLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<SessionId, SessionLock>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`. Released when the guard drops.
    pub async fn acquire(&self, id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                Self::prune(&mut locks);
            }
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries nobody holds or waits on.
    fn prune(locks: &mut HashMap<SessionId, SessionLock>) {
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        debug!(before, after = locks.len(), "Pruned idle session locks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_is_serialized() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::from("s1");
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.acquire(&id).await;

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&id).await;
                order.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().unwrap().push("first");
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_sessions_do_not_block() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(&SessionId::from("a")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&SessionId::from("b")),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let mut map: HashMap<SessionId, SessionLock> = HashMap::new();
        let held: SessionLock = Arc::default();
        map.insert(SessionId::from("held"), held.clone());
        map.insert(SessionId::from("idle"), Arc::default());

        SessionLocks::prune(&mut map);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&SessionId::from("held")));
    }
}
