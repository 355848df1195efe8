//! Per-user Core Memory mutex table (§5, §9 "per-user mutex for Core Memory").
//! Core Memory is read-modify-write over two fixed blocks, so concurrent
//! `append`/`replace` calls for the same user must serialise; every other
//! memory class is append-only and needs no such lock. A single process-wide
//! lock map is deliberately avoided -- locks are per `user_id` and idle ones
//! are evicted so the table doesn't grow unboundedly across many users.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

struct Entry {
    lock: Arc<Mutex<()>>,
    last_used: Instant,
}

pub struct CoreMemoryLocks {
    table: DashMap<String, Entry>,
}

impl CoreMemoryLocks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }

    /// Returns the lock for `user_id`, creating it on first use.
    pub fn get(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut entry = self.table.entry(user_id.to_string()).or_insert_with(|| Entry {
            lock: Arc::new(Mutex::new(())),
            last_used: Instant::now(),
        });
        entry.last_used = Instant::now();
        entry.lock.clone()
    }

    /// Drops locks idle longer than `max_idle` and not currently held. Intended
    /// to be called periodically by a background task, not on the write path.
    pub fn evict_idle(&self, max_idle: std::time::Duration) {
        self.table.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || entry.last_used.elapsed() < max_idle
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for CoreMemoryLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_user_returns_same_lock() {
        let locks = CoreMemoryLocks::new();
        let a = locks.get("alice");
        let b = locks.get("alice");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_users_get_different_locks() {
        let locks = CoreMemoryLocks::new();
        let a = locks.get("alice");
        let b = locks.get("bob");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn serializes_concurrent_access() {
        let locks = Arc::new(CoreMemoryLocks::new());
        let lock = locks.get("alice");
        let _guard = lock.lock().await;
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn eviction_removes_idle_unused_entries() {
        let locks = CoreMemoryLocks::new();
        let _ = locks.get("alice");
        locks.evict_idle(std::time::Duration::from_secs(0));
        assert!(locks.is_empty());
    }
}
