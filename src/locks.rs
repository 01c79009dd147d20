use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard},
};
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slots = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// One async mutex per string key, created on first use and dropped once
/// nobody holds or waits on it.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Slots,
}

/// Held lock for one key. Dropping it releases the key and evicts the slot
/// when no other caller is waiting.
pub struct KeyedGuard {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

fn slots(map: &Slots) -> StdMutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let slot = slots(&self.inner)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            slots: self.inner.clone(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        slots(&self.inner).len()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = slots(&self.slots);
        if map
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            map.remove(&self.key);
        }
    }
}
