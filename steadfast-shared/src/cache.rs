/// Response cache for read endpoints
///
/// One bounded, TTL-expiring moka cache per resource. Read handlers cache
/// serialized responses under a key derived from the request; every mutation
/// of a resource drops that resource's whole cache, so stale pages never
/// outlive a write from this process.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use steadfast_shared::cache::ResponseCache;
///
/// let cache = ResponseCache::new(30, 100);
/// cache.set("tasks", "list?page=1", json!({ "total": 3 }));
/// assert_eq!(cache.get("tasks", "list?page=1"), Some(json!({ "total": 3 })));
///
/// cache.invalidate("tasks");
/// assert_eq!(cache.get("tasks", "list?page=1"), None);
/// ```

use moka::sync::Cache;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

type ResourceCache = Cache<String, Arc<JsonValue>>;

#[derive(Clone)]
pub struct ResponseCache {
    ttl: Duration,
    max_entries: u64,
    caches: Arc<RwLock<HashMap<String, ResourceCache>>>,
}

impl ResponseCache {
    /// Creates an empty cache; `ttl_secs` is clamped to at least one second
    pub fn new(ttl_secs: u64, max_entries: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs.max(1)),
            max_entries: max_entries.max(1),
            caches: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn get(&self, resource: &str, key: &str) -> Option<JsonValue> {
        let caches = self.caches.read().unwrap_or_else(|e| e.into_inner());
        let value = caches.get(resource)?.get(key)?;
        debug!(resource, key, "Cache hit");
        Some(value.as_ref().clone())
    }

    pub fn set(&self, resource: &str, key: &str, value: JsonValue) {
        let cache = self.resource_cache(resource);
        cache.insert(key.to_string(), Arc::new(value));
    }

    /// Drops every cached response of a resource
    pub fn invalidate(&self, resource: &str) {
        let caches = self.caches.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cache) = caches.get(resource) {
            cache.invalidate_all();
            debug!(resource, "Cache invalidated");
        }
    }

    fn resource_cache(&self, resource: &str) -> ResourceCache {
        if let Some(cache) = self
            .caches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(resource)
        {
            return cache.clone();
        }

        let mut caches = self.caches.write().unwrap_or_else(|e| e.into_inner());
        caches
            .entry(resource.to_string())
            .or_insert_with(|| {
                Cache::builder()
                    .time_to_live(self.ttl)
                    .max_capacity(self.max_entries)
                    .build()
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_miss_on_unknown_resource() {
        let cache = ResponseCache::new(30, 10);
        assert_eq!(cache.get("users", "list"), None);
        cache.invalidate("users");
    }

    #[test]
    fn test_invalidate_is_scoped_to_resource() {
        let cache = ResponseCache::new(30, 10);
        cache.set("users", "list", json!([1]));
        cache.set("tasks", "list", json!([2]));

        cache.invalidate("users");

        assert_eq!(cache.get("users", "list"), None);
        assert_eq!(cache.get("tasks", "list"), Some(json!([2])));
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = ResponseCache::new(30, 10);
        let other = cache.clone();
        cache.set("products", "get:1", json!({ "id": 1 }));
        assert_eq!(other.get("products", "get:1"), Some(json!({ "id": 1 })));
    }

    #[test]
    fn test_entries_expire() {
        let cache = ResponseCache::new(1, 10);
        cache.set("roles", "list", json!([]));
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get("roles", "list"), None);
    }
}
