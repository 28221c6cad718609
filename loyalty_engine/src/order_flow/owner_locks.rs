use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per owner. Everything that reads or writes an owner's balance holds that owner's lock.
///
/// Locks are created on first use and never removed; an entry is a few dozen bytes per owner.
#[derive(Debug, Clone, Default)]
pub struct OwnerLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, owner: &str) -> OwnedMutexGuard<()> {
        // Clone the mutex out so that the map shard is not held across the await
        let lock = Arc::clone(self.locks.entry(owner.to_string()).or_default().value());
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
