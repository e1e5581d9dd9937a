//! Response cache for ML summarization results
//!
//! Keys are derived from normalized request content plus the options that shape
//! the result. Entries live in an optional key-value store (Redis by default, or
//! in-process memory) and always carry a TTL chosen by cache type. A missing or
//! broken store degrades every operation to a no-op; it never fails a request.

mod adapter;
mod hasher;
mod key;
mod memory;
pub mod middleware;
mod stats;
mod store;
mod ttl;

pub use adapter::ResponseCache;
pub use hasher::{content_hash, normalize_content};
pub use key::{CacheKey, CacheOptions, CacheType, KEY_VERSION, NAMESPACE};
pub use memory::MemoryStore;
pub use stats::{CacheCounters, CacheHealth, CacheStats};
pub use store::CacheStore;
pub use ttl::TtlPolicy;

#[cfg(feature = "cache-redis")]
mod redis;

#[cfg(feature = "cache-redis")]
pub use redis::RedisStore;

use serde::{Deserialize, Serialize};

/// Default pattern for administrative clears
pub const DEFAULT_CLEAR_PATTERN: &str = "casecrux:*";

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Store backend
    #[serde(default)]
    pub backend: CacheBackend,

    /// URL for the Redis connection. When unset it is resolved from the environment.
    #[serde(default)]
    pub url: Option<String>,

    /// Connection timeout in milliseconds for the single startup attempt
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// TTL tiers in seconds
    #[serde(default)]
    pub ttl: TtlPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            ttl: TtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn memory() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ..Self::default()
        }
    }

    #[cfg(feature = "cache-redis")]
    pub fn redis(url: &str) -> Self {
        Self {
            backend: CacheBackend::Redis,
            url: Some(url.to_string()),
            ..Self::default()
        }
    }
}
