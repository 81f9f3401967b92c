//! Bounded LRU cache for query results.
//!
//! Keys are `(operation, workspace hash, parameter digest)`. Each entry
//! carries an explicit byte cost; the byte total is authoritative because we
//! account for it ourselves at insert and evict time. Expiration is sliding:
//! a hit pushes the deadline out by the full TTL. A side index of keys per
//! workspace makes `clear_workspace` precise.

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::Settings;

struct CacheEntry {
    value: Arc<Value>,
    cost: usize,
    expires_at: Instant,
    workspace: String,
}

struct CacheInner {
    lru: LruCache<String, CacheEntry>,
    total_bytes: usize,
    keys_by_workspace: HashMap<String, HashSet<String>>,
}

/// Bounded in-memory result cache, keyed by workspace.
pub struct QueryCache {
    enabled: bool,
    max_bytes: usize,
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl QueryCache {
    pub fn new(settings: &Settings) -> Self {
        Self {
            enabled: settings.query_cache.enabled,
            max_bytes: settings.query_cache.max_size_mb * 1024 * 1024,
            ttl: settings.cache_ttl(),
            inner: Mutex::new(CacheInner {
                lru: LruCache::unbounded(),
                total_bytes: 0,
                keys_by_workspace: HashMap::new(),
            }),
        }
    }

    /// Look up a cached result, refreshing its sliding expiration.
    pub fn get(&self, operation: &str, workspace: &str, params: &Value) -> Option<Arc<Value>> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(operation, workspace, params);
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired = matches!(inner.lru.peek(&key), Some(entry) if entry.expires_at <= now);
        if expired {
            Self::remove_entry(&mut inner, &key);
            return None;
        }

        let ttl = self.ttl;
        inner.lru.get_mut(&key).map(|entry| {
            entry.expires_at = now + ttl;
            Arc::clone(&entry.value)
        })
    }

    /// Insert a result. Least-recently-used entries are evicted until the
    /// byte total fits; a value larger than the whole cache is refused.
    pub fn put(&self, operation: &str, workspace: &str, params: &Value, value: Value) {
        if !self.enabled {
            return;
        }
        let cost = estimate_cost(&value);
        if cost > self.max_bytes {
            debug!("refusing cache insert of {cost} bytes (cap {})", self.max_bytes);
            return;
        }
        let key = cache_key(operation, workspace, params);
        let mut inner = self.inner.lock();

        Self::remove_entry(&mut inner, &key);
        while inner.total_bytes + cost > self.max_bytes {
            let Some((evicted_key, evicted)) = inner.lru.pop_lru() else {
                break;
            };
            inner.total_bytes -= evicted.cost;
            if let Some(keys) = inner.keys_by_workspace.get_mut(&evicted.workspace) {
                keys.remove(&evicted_key);
            }
        }

        inner.total_bytes += cost;
        inner
            .keys_by_workspace
            .entry(workspace.to_string())
            .or_default()
            .insert(key.clone());
        inner.lru.put(
            key,
            CacheEntry {
                value: Arc::new(value),
                cost,
                expires_at: Instant::now() + self.ttl,
                workspace: workspace.to_string(),
            },
        );
    }

    /// Drop every cached result for one workspace.
    pub fn clear_workspace(&self, workspace: &str) {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner
            .keys_by_workspace
            .remove(workspace)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for key in keys {
            if let Some(entry) = inner.lru.pop(&key) {
                inner.total_bytes -= entry.cost;
            }
        }
    }

    /// Drop everything (compaction hook).
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.lru.clear();
        inner.total_bytes = 0;
        inner.keys_by_workspace.clear();
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().lru.len()
    }

    fn remove_entry(inner: &mut CacheInner, key: &str) {
        if let Some(entry) = inner.lru.pop(key) {
            inner.total_bytes -= entry.cost;
            if let Some(keys) = inner.keys_by_workspace.get_mut(&entry.workspace) {
                keys.remove(key);
            }
        }
    }
}

fn cache_key(operation: &str, workspace: &str, params: &Value) -> String {
    let digest = Sha256::digest(params.to_string().as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("workspace:{workspace}:{operation}:{hex}")
}

/// Rough serialized size of a JSON value.
fn estimate_cost(value: &Value) -> usize {
    value.to_string().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_cache() -> QueryCache {
        let mut settings = Settings::default();
        settings.query_cache.max_size_mb = 1;
        QueryCache::new(&settings)
    }

    #[test]
    fn hit_and_miss() {
        let cache = small_cache();
        let params = json!({"q": "hello"});
        assert!(cache.get("text_search", "ws1", &params).is_none());

        cache.put("text_search", "ws1", &params, json!(["a.txt"]));
        let hit = cache.get("text_search", "ws1", &params).unwrap();
        assert_eq!(*hit, json!(["a.txt"]));

        // Different params, different key.
        assert!(cache.get("text_search", "ws1", &json!({"q": "bye"})).is_none());
        // Different workspace, different key.
        assert!(cache.get("text_search", "ws2", &params).is_none());
    }

    #[test]
    fn byte_total_tracks_inserts_and_evictions() {
        let cache = small_cache();
        assert_eq!(cache.total_bytes(), 0);

        cache.put("op", "ws", &json!(1), json!("0123456789"));
        let after_one = cache.total_bytes();
        assert!(after_one > 0);

        cache.put("op", "ws", &json!(2), json!("0123456789"));
        assert_eq!(cache.total_bytes(), after_one * 2);

        cache.clear_all();
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn oversized_value_is_refused() {
        let mut settings = Settings::default();
        settings.query_cache.max_size_mb = 0; // cap of zero bytes
        let cache = QueryCache::new(&settings);
        cache.put("op", "ws", &json!(1), json!("anything"));
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn lru_eviction_under_byte_pressure() {
        let mut settings = Settings::default();
        settings.query_cache.max_size_mb = 1;
        let cache = QueryCache::new(&settings);
        let big = "x".repeat(400 * 1024);

        cache.put("op", "ws", &json!(1), json!(big.clone()));
        cache.put("op", "ws", &json!(2), json!(big.clone()));
        // Third insert exceeds 1 MB; the least-recently-used must go.
        cache.put("op", "ws", &json!(3), json!(big));

        assert!(cache.get("op", "ws", &json!(1)).is_none());
        assert!(cache.get("op", "ws", &json!(2)).is_some());
        assert!(cache.get("op", "ws", &json!(3)).is_some());
        assert!(cache.total_bytes() <= 1024 * 1024);
    }

    #[test]
    fn clear_workspace_is_precise() {
        let cache = small_cache();
        cache.put("op", "ws1", &json!(1), json!("one"));
        cache.put("op", "ws2", &json!(1), json!("two"));

        cache.clear_workspace("ws1");
        assert!(cache.get("op", "ws1", &json!(1)).is_none());
        assert!(cache.get("op", "ws2", &json!(1)).is_some());
    }

    #[test]
    fn replacing_a_key_does_not_leak_bytes() {
        let cache = small_cache();
        cache.put("op", "ws", &json!(1), json!("0123456789"));
        let single = cache.total_bytes();
        cache.put("op", "ws", &json!(1), json!("9876543210"));
        assert_eq!(cache.total_bytes(), single);
        assert_eq!(cache.entry_count(), 1);
    }
}
