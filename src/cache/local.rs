//! A bounded, in-process store of stage results.
//!
//! Finished values live in the LRU. A key being produced has an entry in a
//! separate pending map until its producer returns, so eviction never drops
//! work in flight. The store lock is held only to look up or update these two
//! maps; the producer runs under that key's pending lock alone, so concurrent
//! callers for one key wait for the first caller's result while other keys
//! proceed.

use lru::LruCache;
use std::collections::HashMap;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const DEFAULT_CAPACITY: usize = 200;

/// A poisoned lock only means another producer panicked; the data is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Store<K: Hash + Eq, V> {
    values: LruCache<K, V>,
    /// Keys with a running producer. Removed when it returns, whatever the outcome.
    pending: HashMap<K, Arc<Mutex<()>>>,
}

enum Lookup<V> {
    Ready(V),
    Pending(Arc<Mutex<()>>),
}

pub struct LocalCache<K: Hash + Eq, V> {
    store: Mutex<Store<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> LocalCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { store: Mutex::new(Store { values: LruCache::new(capacity), pending: HashMap::new() }) }
    }

    fn lookup(&self, key: &K) -> Lookup<V> {
        let mut store = lock(&self.store);
        if let Some(value) = store.values.get(key) {
            return Lookup::Ready(value.clone());
        }
        let gate = store.pending.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(())));
        Lookup::Pending(Arc::clone(gate))
    }

    /// The cached value for `key`, or the producer's result.
    ///
    /// A failed producer leaves nothing behind, so the next caller tries again.
    pub fn get_or_compute<E>(&self, key: K, producer: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        loop {
            let gate = match self.lookup(&key) {
                Lookup::Ready(value) => return Ok(value),
                Lookup::Pending(gate) => gate,
            };
            let _turn = lock(&gate);
            {
                let mut store = lock(&self.store);
                if let Some(value) = store.values.get(&key) {
                    return Ok(value.clone());
                }
                // The previous holder failed and a newer gate replaced ours; queue on that one.
                if !store.pending.get(&key).is_some_and(|current| Arc::ptr_eq(current, &gate)) {
                    continue;
                }
            }

            let produced = producer();
            let mut store = lock(&self.store);
            store.pending.remove(&key);
            let value = produced?;
            store.values.put(key, value.clone());
            return Ok(value);
        }
    }

    /// The cached value, if present. Does not wait for a running producer.
    pub fn get(&self, key: &K) -> Option<V> {
        lock(&self.store).values.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        lock(&self.store).values.put(key, value);
    }

    /// Number of finished values held.
    pub fn len(&self) -> usize {
        lock(&self.store).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        lock(&self.store).values.cap().get()
    }
}

impl<K: Hash + Eq + Clone, V: Clone> Default for LocalCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrent_callers_share_one_computation() {
        let cache: Arc<LocalCache<&'static str, usize>> = Arc::new(LocalCache::new(4));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    cache
                        .get_or_compute("parent_fit", || {
                            thread::sleep(Duration::from_millis(50));
                            Ok::<_, ()>(counter.fetch_add(1, Ordering::SeqCst) + 1)
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0], results[1]);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache: LocalCache<u32, u32> = LocalCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        assert_eq!(cache.get(&1), Some(10));
        cache.insert(3, 30);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_producer_is_retried() {
        let cache: LocalCache<u32, u32> = LocalCache::default();
        assert_eq!(cache.get_or_compute(7, || Err("solver crashed")), Err("solver crashed"));
        assert_eq!(cache.get(&7), None);
        assert_eq!(cache.get_or_compute(7, || Ok::<_, &str>(70)), Ok(70));
        assert_eq!(cache.get_or_compute(7, || Ok::<_, &str>(71)), Ok(70));
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        assert!(lock(&cache.store).pending.is_empty());
    }

    #[test]
    fn test_value_in_flight_survives_eviction() {
        let cache: Arc<LocalCache<u32, usize>> = Arc::new(LocalCache::new(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |cache: Arc<LocalCache<u32, usize>>, calls: Arc<AtomicUsize>| {
            thread::spawn(move || {
                cache
                    .get_or_compute(1, || {
                        thread::sleep(Duration::from_millis(300));
                        Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) + 1)
                    })
                    .unwrap()
            })
        };
        let first = compute(Arc::clone(&cache), Arc::clone(&calls));
        thread::sleep(Duration::from_millis(50));
        // fills the only LRU entry while key 1 is still being produced
        cache.insert(2, 20);
        let second = compute(Arc::clone(&cache), Arc::clone(&calls));

        assert_eq!(first.join().unwrap(), 1);
        assert_eq!(second.join().unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_waiter_retries_after_failed_producer() {
        let cache: Arc<LocalCache<u32, u32>> = Arc::new(LocalCache::new(2));
        let failing = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_compute(5, || {
                    thread::sleep(Duration::from_millis(150));
                    Err("timed out")
                })
            })
        };
        thread::sleep(Duration::from_millis(30));
        let retried = cache.get_or_compute(5, || Ok::<_, &str>(50));

        assert_eq!(failing.join().unwrap(), Err("timed out"));
        assert_eq!(retried, Ok(50));
        assert!(lock(&cache.store).pending.is_empty());
    }
}
