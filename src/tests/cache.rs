use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::cache::HandleCache;

#[test]
fn test_cache_evicts_least_recent() {
    let cache: HandleCache<u32, str> = HandleCache::new(NonZeroUsize::new(2).unwrap());
    cache.insert(1, Arc::from("one"));
    cache.insert(2, Arc::from("two"));

    // touch 1 so 2 is the oldest
    assert_eq!(cache.get(&1).as_deref(), Some("one"));
    cache.insert(3, Arc::from("three"));

    assert!(cache.get(&2).is_none());
    assert!(cache.get(&1).is_some());
    assert!(cache.get(&3).is_some());
    assert_eq!(cache.len(), 2);

    let m = cache.metrics();
    assert_eq!(m.evictions, 1);
    assert_eq!(m.hits, 3);
    assert_eq!(m.misses, 1);
}

#[test]
fn test_cache_replace_is_not_eviction() {
    let cache: HandleCache<u32, str> = HandleCache::new(NonZeroUsize::new(2).unwrap());
    cache.insert(1, Arc::from("a"));
    cache.insert(1, Arc::from("b"));
    assert_eq!(cache.metrics().evictions, 0);
    assert_eq!(cache.get(&1).as_deref(), Some("b"));

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.capacity(), 2);
}
