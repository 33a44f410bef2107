use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Sharded per-key lock table enforcing at-most-one in-flight run per rule or
/// action. Overlapping ticks fail to acquire and drop, they never queue.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a guard when the key is free, `None` when a run is already in
    /// flight for it.
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned().ok()
    }

    /// Drops the slot for a deleted record.
    pub fn remove(&self, key: &str) {
        self.locks.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let locks = KeyLocks::new();
        let guard = locks.try_acquire("ns_rule").unwrap();
        assert!(locks.try_acquire("ns_rule").is_none());
        drop(guard);
        assert!(locks.try_acquire("ns_rule").is_some());
    }

    #[test]
    fn keys_are_independent() {
        let locks = KeyLocks::new();
        let _a = locks.try_acquire("ns_a").unwrap();
        assert!(locks.try_acquire("ns_b").is_some());
    }

    #[test]
    fn remove_clears_slot() {
        let locks = KeyLocks::new();
        let guard = locks.try_acquire("ns_rule").unwrap();
        locks.remove("ns_rule");
        // The old guard still protects the old slot; a fresh slot is free.
        assert!(locks.try_acquire("ns_rule").is_some());
        drop(guard);
    }
}
