//! Render Cache
//!
//! Byte-bounded LRU shared by every renderer of one loaded trace.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

/// Default byte budget for reconstructed HTML per loaded trace
pub const DEFAULT_RENDER_CACHE_BYTES: usize = 250_000_000;

struct Entry<V> {
    value: V,
    size: usize,
    tick: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Recency order: oldest tick first
    order: BTreeMap<u64, K>,
    total: usize,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> Inner<K, V> {
    fn touch(&mut self, key: &K) -> Option<V> {
        let tick = self.next_tick;
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.clone());
        self.next_tick += 1;
        Some(entry.value.clone())
    }

    fn insert(&mut self, key: K, value: V, size: usize, budget: usize) {
        if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.tick);
            self.total -= old.size;
        }
        // Evict before inserting; an entry larger than the whole budget still
        // goes in once the cache is empty.
        while self.total + size > budget {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total -= evicted.size;
                debug!(bytes = evicted.size, "Evicted cached render");
            }
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        self.order.insert(tick, key.clone());
        self.entries.insert(key, Entry { value, size, tick });
        self.total += size;
    }
}

/// Least-recently-used cache bounded by total value size.
pub struct LruCache<K, V> {
    budget: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                total: 0,
                next_tick: 0,
            }),
        }
    }

    /// Byte budget this cache was created with.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Look up a value, promoting it to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().touch(key)
    }

    /// Insert a value of the given size, evicting the oldest entries first.
    pub fn insert(&self, key: K, value: V, size: usize) {
        self.inner.lock().insert(key, value, size, self.budget);
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// The lock is held across `compute`, so concurrent callers for one
    /// uncached key run it exactly once.
    pub fn get_or_compute<F>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> (V, usize),
    {
        let mut inner = self.inner.lock();
        if let Some(value) = inner.touch(&key) {
            return value;
        }
        let (value, size) = compute();
        inner.insert(key, value.clone(), size, self.budget);
        value
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the sizes of all cached values.
    pub fn total_size(&self) -> usize {
        self.inner.lock().total
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.total = 0;
    }
}

/// Cache of rendered HTML keyed by renderer id.
pub type RenderCache = LruCache<u64, Arc<str>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_evicts_least_recently_used() {
        let cache: LruCache<&str, u32> = LruCache::new(10);
        cache.insert("a", 1, 4);
        cache.insert("b", 2, 4);
        assert_eq!(cache.get(&"a"), Some(1));
        cache.insert("c", 3, 4);
        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.total_size(), 8);
    }

    #[test]
    fn test_oversized_entry_is_kept_alone() {
        let cache: LruCache<u64, u32> = LruCache::new(5);
        cache.insert(1, 1, 2);
        cache.insert(2, 2, 50);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&2), Some(2));
    }

    #[test]
    fn test_reinsert_replaces_size() {
        let cache: LruCache<u64, u32> = LruCache::new(10);
        cache.insert(1, 1, 6);
        cache.insert(1, 2, 3);
        assert_eq!(cache.total_size(), 3);
        assert_eq!(cache.get(&1), Some(2));
    }

    #[test]
    fn test_get_or_compute_runs_once() {
        let cache: Arc<RenderCache> = Arc::new(LruCache::new(1000));
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache.get_or_compute(7, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let html: Arc<str> = Arc::from("<html></html>");
                        let size = html.len();
                        (html, size)
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(&*handle.join().unwrap(), "<html></html>");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
