//! 按 key 加锁（证书 id / 记录 id）

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// One async mutex per key, created on demand.
///
/// Entries nobody holds or waits for are pruned on the next access.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

/// Held while the key is locked; dropping it releases the key.
pub struct KeyedGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|k, slot| k == key || Arc::strong_count(slot) > 1);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    /// Wait until `key` is free.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        KeyedGuard {
            _guard: self.slot(key).lock_owned().await,
        }
    }

    /// `None` when someone else holds `key`.
    pub fn try_lock(&self, key: &str) -> Option<KeyedGuard> {
        self.slot(key)
            .try_lock_owned()
            .ok()
            .map(|guard| KeyedGuard { _guard: guard })
    }

    /// Keys currently tracked.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn try_lock_is_exclusive_per_key() {
        let locks = KeyedLocks::new();
        let held = locks.try_lock("c1").unwrap();
        assert!(locks.try_lock("c1").is_none());
        assert!(locks.try_lock("c2").is_some());

        drop(held);
        assert!(locks.try_lock("c1").is_some());
    }

    #[tokio::test]
    async fn lock_waits_for_holder() {
        let locks = Arc::new(KeyedLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.lock("r1").await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.lock("r1").await;
                order.lock().unwrap().push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().unwrap().push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*order.lock().unwrap(), ["first", "second"]);
    }

    #[test]
    fn released_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.try_lock("a"));
        drop(locks.try_lock("b"));
        let _c = locks.try_lock("c");
        assert_eq!(locks.len(), 1);
        // c 仍被持有，不会被清理
        let _d = locks.try_lock("d");
        assert_eq!(locks.len(), 2);
    }
}
