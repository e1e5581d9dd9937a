//! Raw key-value store interface

use async_trait::async_trait;

/// The subset of a Redis-like store the response cache relies on.
///
/// Every write carries an expiry; there is no plain `set`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the raw value stored at `key`
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store `value` at `key`, expiring after `ttl_secs`
    async fn set_ex(&self, key: &str, ttl_secs: u64, value: String) -> anyhow::Result<()>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> anyhow::Result<usize>;

    /// List keys matching a glob pattern (`*`, `?`, `[...]`)
    async fn keys(&self, pattern: &str) -> anyhow::Result<Vec<String>>;

    /// Number of live keys
    async fn db_size(&self) -> anyhow::Result<usize>;

    /// Memory report in the store's own format
    async fn info(&self) -> anyhow::Result<String>;

    /// Round-trip check
    async fn ping(&self) -> anyhow::Result<()>;

    /// Backend name for logs and stats
    fn backend_name(&self) -> &'static str;
}
