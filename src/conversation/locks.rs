//! Per-session async locks for read-modify-write paths.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::conversation::core::ids::SessionId;

/// Keyed mutexes that serialize writers of the same session within one process.
///
/// Entries are dropped once no task holds or waits on them, so the map only
/// grows with the number of sessions being written concurrently.
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<SessionId, Arc<Mutex<()>>>,
}

/// Guard returned by [`SessionLocks::acquire`]; releases and prunes on drop.
pub struct SessionGuard<'a> {
    owner: &'a SessionLocks,
    id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SessionLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: &SessionId) -> SessionGuard<'_> {
        let lock = self
            .locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            owner: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of sessions currently holding or awaiting a lock.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map itself still references the mutex: nobody is waiting.
        self.owner
            .locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
