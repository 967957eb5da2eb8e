//! Bounded memoization for remote lookups.
//!
//! A `BoundedCache` wraps an expensive computation (an index page fetch, a
//! per-version metadata query) so repeated calls with the same key are cheap.
//! Entries never expire within a process run; once the configured capacity is
//! exceeded, the least-recently-inserted entry is evicted. Callers must not
//! depend on cache presence for correctness, only for cost: recomputation
//! after eviction is indistinguishable from a fresh miss.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

/// A size-limited memoizing map with first-in-first-out eviction.
///
/// Concurrent callers requesting the same key are serialized on a per-key
/// slot, so the compute function runs at most once per key even when several
/// threads miss at the same time; later callers wait for and reuse the
/// in-flight result. A compute error is returned to the caller and never
/// stored, so the next call with that key retries.
pub struct BoundedCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    slots: HashMap<K, Arc<Slot<V>>>,
    order: VecDeque<K>,
}

struct Slot<V>(Mutex<Option<V>>);

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be at least 1");
        BoundedCache {
            capacity,
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Get the value for `key`, running `compute` on a miss.
    ///
    /// Holds only the per-key slot lock while `compute` runs, so lookups for
    /// other keys proceed concurrently.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let slot = self.slot_for(&key);

        let mut value = slot.0.lock().unwrap();
        if let Some(v) = value.as_ref() {
            return Ok(v.clone());
        }

        match compute() {
            Ok(v) => {
                *value = Some(v.clone());
                Ok(v)
            }
            Err(e) => {
                // Forget the slot so a later call retries, but only if it is
                // still ours (it may already have been evicted and replaced).
                let mut inner = self.inner.lock().unwrap();
                if let Some(current) = inner.slots.get(&key) {
                    if Arc::ptr_eq(current, &slot) {
                        inner.slots.remove(&key);
                        inner.order.retain(|k| k != &key);
                    }
                }
                Err(e)
            }
        }
    }

    /// Infallible variant of [`BoundedCache::get_or_try_insert_with`].
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        let result: Result<V, std::convert::Infallible> =
            self.get_or_try_insert_with(key, || Ok(compute()));
        match result {
            Ok(v) => v,
            Err(e) => match e {},
        }
    }

    /// Look up or create the slot for `key`, evicting the oldest entries if
    /// the insertion pushed the cache over capacity.
    fn slot_for(&self, key: &K) -> Arc<Slot<V>> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(slot) = inner.slots.get(key) {
            return slot.clone();
        }

        let slot = Arc::new(Slot(Mutex::new(None)));
        inner.slots.insert(key.clone(), slot.clone());
        inner.order.push_back(key.clone());

        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                tracing::debug!("evicting cache entry");
                inner.slots.remove(&evicted);
            }
        }

        slot
    }

    /// Number of entries currently held (including in-flight computations).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().slots.len()
    }

    /// Check whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_computes_once_per_key() {
        let cache: BoundedCache<String, u32> = BoundedCache::new(8);
        let calls = AtomicUsize::new(0);

        let a = cache.get_or_insert_with("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        });
        let b = cache.get_or_insert_with("k".to_string(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            99
        });

        assert_eq!(a, 42);
        assert_eq!(b, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(2);
        let calls = AtomicUsize::new(0);

        let mut get = |k: u32| {
            cache.get_or_insert_with(k, || {
                calls.fetch_add(1, Ordering::SeqCst);
                k * 10
            })
        };

        get(1);
        get(2);
        get(3); // evicts 1
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 2 and 3 are still cached.
        get(2);
        get(3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // 1 was evicted and is recomputed as a fresh miss.
        assert_eq!(get(1), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_error_is_not_cached() {
        let cache: BoundedCache<&'static str, u32> = BoundedCache::new(4);

        let err: Result<u32, &'static str> =
            cache.get_or_try_insert_with("k", || Err("network down"));
        assert_eq!(err, Err("network down"));
        assert!(cache.is_empty());

        let ok: Result<u32, &'static str> = cache.get_or_try_insert_with("k", || Ok(7));
        assert_eq!(ok, Ok(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_misses_compute_once() {
        let cache: Arc<BoundedCache<u32, u32>> = Arc::new(BoundedCache::new(4));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_insert_with(1, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        123
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 123);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
