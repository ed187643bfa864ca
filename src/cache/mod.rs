//! Read-side cache contract.
//!
//! The progression pipeline and batch jobs only need a narrow invalidation
//! surface; storage, TTLs, and serialization belong to the implementation.
//! `MemoryCache` is the in-process implementation used in tests and
//! single-process deployments.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// Cache bucket for per-user weekly/monthly summaries.
pub const ACTIVITY_SUMMARY_CACHE: &str = "activity_summary";

/// Cache bucket for per-user monthly stats, keyed `{user}_{year}_{month}`.
pub const ACTIVITY_STATS_CACHE: &str = "activity_stats";

/// A named-bucket key-value cache.
pub trait Cache: Send + Sync {
    /// Look up a memoized value.
    fn get(&self, cache: &str, key: &str) -> Option<Value>;

    /// Memoize a value.
    fn put(&self, cache: &str, key: &str, value: Value);

    /// Evict a single key.
    fn invalidate(&self, cache: &str, key: &str);

    /// Evict a whole bucket.
    fn clear(&self, cache: &str) -> Result<(), CacheError>;
}

/// In-memory cache keyed by bucket name.
#[derive(Default)]
pub struct MemoryCache {
    buckets: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a bucket (test helper).
    pub fn len(&self, cache: &str) -> usize {
        self.buckets
            .read()
            .unwrap()
            .get(cache)
            .map_or(0, |bucket| bucket.len())
    }

    pub fn is_empty(&self, cache: &str) -> bool {
        self.len(cache) == 0
    }
}

impl Cache for MemoryCache {
    fn get(&self, cache: &str, key: &str) -> Option<Value> {
        self.buckets
            .read()
            .unwrap()
            .get(cache)
            .and_then(|bucket| bucket.get(key))
            .cloned()
    }

    fn put(&self, cache: &str, key: &str, value: Value) {
        self.buckets
            .write()
            .unwrap()
            .entry(cache.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    fn invalidate(&self, cache: &str, key: &str) {
        if let Some(bucket) = self.buckets.write().unwrap().get_mut(cache) {
            bucket.remove(key);
        }
    }

    fn clear(&self, cache: &str) -> Result<(), CacheError> {
        if let Some(bucket) = self.buckets.write().unwrap().get_mut(cache) {
            bucket.clear();
        }
        Ok(())
    }
}

/// Cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get_invalidate() {
        let cache = MemoryCache::new();
        cache.put(ACTIVITY_SUMMARY_CACHE, "user-1", json!({"total": 12.0}));

        assert!(cache.get(ACTIVITY_SUMMARY_CACHE, "user-1").is_some());
        assert!(cache.get(ACTIVITY_SUMMARY_CACHE, "user-2").is_none());
        assert!(cache.get(ACTIVITY_STATS_CACHE, "user-1").is_none());

        cache.invalidate(ACTIVITY_SUMMARY_CACHE, "user-1");
        assert!(cache.get(ACTIVITY_SUMMARY_CACHE, "user-1").is_none());
    }

    #[test]
    fn test_clear_bucket_leaves_others() {
        let cache = MemoryCache::new();
        cache.put(ACTIVITY_SUMMARY_CACHE, "user-1", json!(1));
        cache.put(ACTIVITY_STATS_CACHE, "user-1_2025_6", json!(2));

        cache.clear(ACTIVITY_SUMMARY_CACHE).unwrap();
        assert!(cache.is_empty(ACTIVITY_SUMMARY_CACHE));
        assert_eq!(cache.len(ACTIVITY_STATS_CACHE), 1);
    }
}
