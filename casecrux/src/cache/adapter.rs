//! Fail-soft adapter over an optional cache store

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use super::memory::MemoryStore;
use super::stats::{CacheCounters, CacheHealth, CacheStats};
use super::store::CacheStore;
use super::ttl::TtlPolicy;
use super::{CacheBackend, CacheConfig};

/// Response cache shared by all request handlers.
///
/// None of its operations return errors: store failures are logged and reported
/// as a miss, a failed write, or an empty result.
pub struct ResponseCache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: TtlPolicy,
    counters: CacheCounters,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: TtlPolicy) -> Self {
        Self {
            store: Some(store),
            ttl,
            counters: CacheCounters::new(),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: TtlPolicy::default(),
            counters: CacheCounters::new(),
        }
    }

    /// In-process cache with default TTL tiers
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), TtlPolicy::default())
    }

    /// Build the cache from configuration, attempting the store connection once.
    ///
    /// Connection failures are logged and yield a disabled cache.
    pub async fn connect(config: &CacheConfig) -> Self {
        if !config.enabled {
            tracing::info!("Response cache disabled by configuration");
            return Self::disabled();
        }

        match config.backend {
            CacheBackend::Memory => {
                tracing::info!("Using in-memory response cache");
                Self::new(Arc::new(MemoryStore::new()), config.ttl.clone())
            }
            CacheBackend::Redis => Self::connect_redis(config).await,
        }
    }

    #[cfg(feature = "cache-redis")]
    async fn connect_redis(config: &CacheConfig) -> Self {
        let Some(url) = config.url.as_deref() else {
            tracing::info!("No Redis URL configured - continuing without cache");
            return Self::disabled();
        };

        let timeout = std::time::Duration::from_millis(config.connect_timeout_ms);
        match super::RedisStore::connect(url, timeout).await {
            Ok(store) => {
                tracing::info!("Connected to Redis response cache");
                Self::new(Arc::new(store), config.ttl.clone())
            }
            Err(e) => {
                tracing::warn!("Redis connection failed - continuing without cache: {}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn connect_redis(_config: &CacheConfig) -> Self {
        tracing::warn!("Redis backend requested but built without 'cache-redis' feature");
        Self::disabled()
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    pub fn counters(&self) -> &CacheCounters {
        &self.counters
    }

    /// Look up a cached JSON value
    pub async fn get(&self, key: &str) -> Option<Value> {
        let Some(store) = &self.store else {
            tracing::debug!("Cache not available - treating as miss");
            return None;
        };

        let start = Instant::now();
        let raw = match store.get(key).await {
            Ok(raw) => raw,
            Err(e) => {
                self.counters.error();
                tracing::error!("Cache read error: {}", e);
                return None;
            }
        };
        let elapsed = start.elapsed();

        let Some(raw) = raw else {
            self.counters.miss();
            tracing::info!("Cache MISS: {} ({:?})", short(key), elapsed);
            return None;
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.counters.hit();
                tracing::info!("Cache HIT: {} ({:?})", short(key), elapsed);
                Some(value)
            }
            Err(e) => {
                self.counters.error();
                tracing::error!("Discarding undecodable cache entry {}: {}", short(key), e);
                None
            }
        }
    }

    /// Store a JSON value with an expiry. Returns whether the write succeeded.
    pub async fn set(&self, key: &str, value: &Value, ttl_secs: u64) -> bool {
        let Some(store) = &self.store else {
            tracing::debug!("Cache not available - skipping cache set");
            return false;
        };

        if ttl_secs == 0 {
            tracing::warn!("Refusing to cache {} without a TTL", short(key));
            return false;
        }

        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                self.counters.error();
                tracing::error!("Failed to serialize cache entry: {}", e);
                return false;
            }
        };
        let size_kb = serialized.len() as f64 / 1024.0;

        let start = Instant::now();
        match store.set_ex(key, ttl_secs, serialized).await {
            Ok(()) => {
                self.counters.write();
                tracing::info!(
                    "Cache SET: {} ({:?}, {:.2}KB, TTL: {}s)",
                    short(key),
                    start.elapsed(),
                    size_kb,
                    ttl_secs
                );
                true
            }
            Err(e) => {
                self.counters.error();
                tracing::error!("Cache write error: {}", e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        match store.del(&[key.to_string()]).await {
            Ok(removed) => {
                tracing::info!("Cache DELETE: {} (deleted: {})", key, removed);
                removed > 0
            }
            Err(e) => {
                self.counters.error();
                tracing::error!("Cache delete error: {}", e);
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            hits: self.counters.hits(),
            misses: self.counters.misses(),
            writes: self.counters.writes(),
            errors: self.counters.errors(),
            hit_rate: self.counters.hit_rate(),
            ..CacheStats::default()
        };

        let Some(store) = &self.store else {
            return stats;
        };
        stats.backend = Some(store.backend_name().to_string());

        let info = store.info().await;
        let key_count = store.db_size().await;
        match (info, key_count) {
            (Ok(info), Ok(key_count)) => {
                stats.available = true;
                stats.connected = Some(true);
                stats.key_count = Some(key_count);
                stats.memory_info = Some(info);
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Error getting cache stats: {}", e);
                stats.connected = Some(false);
                stats.error = Some(e.to_string());
            }
        }
        stats
    }

    /// Delete every key matching a glob pattern. Returns how many were removed.
    pub async fn clear_by_pattern(&self, pattern: &str) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let keys = match store.keys(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                self.counters.error();
                tracing::error!("Error listing cache keys for '{}': {}", pattern, e);
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        match store.del(&keys).await {
            Ok(removed) => {
                tracing::info!("Cleared {} cache entries matching pattern: {}", removed, pattern);
                removed
            }
            Err(e) => {
                self.counters.error();
                tracing::error!("Error clearing cache pattern '{}': {}", pattern, e);
                0
            }
        }
    }

    /// Probe the store with a PING
    pub async fn health(&self) -> CacheHealth {
        let Some(store) = &self.store else {
            return CacheHealth {
                healthy: false,
                message: "Cache store not available".to_string(),
                response_time_ms: None,
            };
        };

        let start = Instant::now();
        match store.ping().await {
            Ok(()) => CacheHealth {
                healthy: true,
                message: format!("{} is healthy", store.backend_name()),
                response_time_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(e) => CacheHealth {
                healthy: false,
                message: format!("{} health check failed: {}", store.backend_name(), e),
                response_time_ms: None,
            },
        }
    }
}

fn short(key: &str) -> String {
    let prefix: String = key.chars().take(50).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Store whose every operation fails, as a dropped connection would
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            anyhow::bail!("connection reset")
        }
        async fn set_ex(&self, _key: &str, _ttl: u64, _value: String) -> anyhow::Result<()> {
            anyhow::bail!("connection reset")
        }
        async fn del(&self, _keys: &[String]) -> anyhow::Result<usize> {
            anyhow::bail!("connection reset")
        }
        async fn keys(&self, _pattern: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("connection reset")
        }
        async fn db_size(&self) -> anyhow::Result<usize> {
            anyhow::bail!("connection reset")
        }
        async fn info(&self) -> anyhow::Result<String> {
            anyhow::bail!("connection reset")
        }
        async fn ping(&self) -> anyhow::Result<()> {
            anyhow::bail!("connection reset")
        }
        fn backend_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = ResponseCache::memory();
        let value = json!({"summary": "short", "pages": 3, "tags": ["a", "b"]});

        assert!(cache.set("k", &value, 60).await);
        assert_eq!(cache.get("k").await, Some(value));
        assert_eq!(cache.counters().hits(), 1);
    }

    #[tokio::test]
    async fn test_set_replaces_previous_value() {
        let cache = ResponseCache::memory();
        cache.set("k", &json!({"a": 1, "b": 2}), 60).await;
        cache.set("k", &json!({"c": 3}), 60).await;
        assert_eq!(cache.get("k").await, Some(json!({"c": 3})));
    }

    #[tokio::test]
    async fn test_zero_ttl_refused() {
        let cache = ResponseCache::memory();
        assert!(!cache.set("k", &json!(1), 0).await);
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_miss() {
        let cache = ResponseCache::memory();
        cache.set("k", &json!({"v": 1}), 10).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.counters().misses(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_degrades() {
        let cache = ResponseCache::disabled();
        assert!(!cache.is_available());
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.set("k", &json!(1), 60).await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.clear_by_pattern("*").await, 0);

        let stats = cache.stats().await;
        assert!(!stats.available);
        assert!(!cache.health().await.healthy);
    }

    #[tokio::test]
    async fn test_broken_store_never_raises() {
        let cache = ResponseCache::new(Arc::new(BrokenStore), TtlPolicy::default());
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.set("k", &json!({"a": 1}), 60).await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.clear_by_pattern("casecrux:*").await, 0);

        let stats = cache.stats().await;
        assert!(!stats.available);
        assert_eq!(stats.connected, Some(false));
        assert!(stats.error.is_some());
        assert!(cache.counters().errors() >= 4);
    }

    #[tokio::test]
    async fn test_clear_by_pattern() {
        let cache = ResponseCache::memory();
        cache.set("casecrux:v1:chunk:a", &json!(1), 60).await;
        cache.set("casecrux:v1:chunk:b", &json!(2), 60).await;
        cache.set("casecrux:v1:category:c", &json!(3), 60).await;
        cache.set("other:key", &json!(4), 60).await;

        assert_eq!(cache.clear_by_pattern("casecrux:v1:chunk:*").await, 2);
        assert_eq!(cache.clear_by_pattern("casecrux:*").await, 1);
        assert_eq!(cache.get("other:key").await, Some(json!(4)));
    }

    #[tokio::test]
    async fn test_stats_and_delete() {
        let cache = ResponseCache::memory();
        cache.set("a", &json!(1), 60).await;
        cache.set("b", &json!(2), 60).await;
        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);

        let stats = cache.stats().await;
        assert!(stats.available);
        assert_eq!(stats.key_count, Some(1));
        assert_eq!(stats.backend.as_deref(), Some("memory"));
        assert_eq!(stats.writes, 2);
    }

    #[tokio::test]
    async fn test_connect_without_url_is_disabled() {
        let config = CacheConfig::default();
        let cache = ResponseCache::connect(&config).await;
        assert!(!cache.is_available());
    }

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let cache = ResponseCache::connect(&CacheConfig::memory()).await;
        assert!(cache.is_available());
        assert!(cache.health().await.healthy);
    }
}
