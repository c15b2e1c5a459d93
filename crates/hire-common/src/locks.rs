use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutexes. Holding the guard serializes every
/// scan-then-write sequence for that key.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        // clone the Arc out so the shard guard is dropped before awaiting
        let mutex = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drops entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
