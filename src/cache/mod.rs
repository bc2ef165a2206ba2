use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Inner<K: Hash + Eq, V: ?Sized> {
    entries: LruCache<K, Arc<V>>,
    metrics: CacheMetrics,
}

/// Size-bounded LRU of shared handles. Evicted handles are dropped once the
/// last outstanding `Arc` goes away.
pub struct HandleCache<K: Hash + Eq, V: ?Sized> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> HandleCache<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: ?Sized,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                metrics: CacheMetrics::default(),
            }),
        }
    }

    // A poisoned lock only means another thread panicked mid-lookup; the
    // LRU itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let mut inner = self.lock();
        match inner.entries.get(key).cloned() {
            Some(v) => {
                inner.metrics.hits += 1;
                Some(v)
            }
            None => {
                inner.metrics.misses += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: K, value: Arc<V>) {
        let mut inner = self.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), value) {
            if evicted != key {
                inner.metrics.evictions += 1;
                debug!(?evicted, "evicted cached handle");
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.lock().entries.pop(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().entries.cap().get()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.lock().metrics
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }
}
