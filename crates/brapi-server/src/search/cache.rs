//! Job status/result cache

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value cache with per-entry TTL and invalidation tags
#[async_trait]
pub trait JobCache: Send + Sync {
    /// Live entry under `key`; expired entries are never returned
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]);

    /// Drop every entry carrying at least one of `tags`
    async fn invalidate_all(&self, tags: &[String]);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
    tags: BTreeSet<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local [`JobCache`]
#[derive(Debug, Default)]
pub struct MemoryJobCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryJobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired search jobs");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl JobCache for MemoryJobCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {},
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration, tags: &[String]) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
            tags: tags.iter().cloned().collect(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn invalidate_all(&self, tags: &[String]) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| !tags.iter().any(|tag| entry.tags.contains(tag)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_and_set() {
        let cache = MemoryJobCache::new();
        assert!(cache.get("a").await.is_none());

        cache.set("a", json!({"n": 1}), Duration::from_secs(60), &[]).await;
        assert_eq!(cache.get("a").await, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped_on_read() {
        let cache = MemoryJobCache::new();
        cache.set("a", json!(1), Duration::ZERO, &[]).await;
        assert!(cache.get("a").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryJobCache::new();
        cache.set("old", json!(1), Duration::ZERO, &[]).await;
        cache.set("new", json!(2), Duration::from_secs(60), &[]).await;
        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_tag() {
        let cache = MemoryJobCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a", json!(1), ttl, &["search:v1".to_string()]).await;
        cache.set("b", json!(2), ttl, &["search:v2".to_string()]).await;

        cache.invalidate_all(&["search:v2".to_string()]).await;
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
    }
}
