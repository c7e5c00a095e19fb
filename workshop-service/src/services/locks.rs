//! Per-request serialization.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// One async mutex per request id. Mutations of the same request run one at
/// a time; different requests never wait on each other.
///
/// Entries live only while someone holds or waits for them.
#[derive(Clone, Default)]
pub struct RequestLocks {
    locks: Arc<LockMap>,
}

/// Held lock on one request. Dropping it releases the lock and evicts the
/// map entry once nobody else is waiting.
pub struct RequestGuard {
    guard: Option<OwnedMutexGuard<()>>,
    request_id: Uuid,
    locks: Arc<LockMap>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, request_id: Uuid) -> RequestGuard {
        // Clone the Arc out so no map shard guard is held across the await.
        let lock = self
            .locks
            .entry(request_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        RequestGuard {
            guard: Some(lock.lock_owned().await),
            request_id,
            locks: self.locks.clone(),
        }
    }

    /// Number of requests with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.guard.take();
        // The shard lock is held while the predicate runs, so no acquirer can
        // clone the mutex between the count check and the removal.
        self.locks
            .remove_if(&self.request_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
