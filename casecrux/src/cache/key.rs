//! Structured cache keys

use std::collections::BTreeMap;
use std::fmt;

use super::hasher::md5_hex;

/// Key namespace shared by every entry this service writes
pub const NAMESPACE: &str = "casecrux";

/// Bump to invalidate every previously written entry
pub const KEY_VERSION: &str = "v1";

/// Options folded into a cache key, kept sorted so insertion order never matters
pub type CacheOptions = BTreeMap<String, serde_json::Value>;

/// Kind of cached result. Determines the key segment and the TTL tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheType {
    BasicSummary,
    UrlSummary,
    AdvancedSummary,
    CategorySummary,
    Chunk,
    Category,
    UserRecent,
    /// Any other tag; cached with the default tier
    Other(String),
}

impl CacheType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::BasicSummary => "basic_summary",
            Self::UrlSummary => "url_summary",
            Self::AdvancedSummary => "advanced_summary",
            Self::CategorySummary => "category_summary",
            Self::Chunk => "chunk",
            Self::Category => "category",
            Self::UserRecent => "user_recent",
            Self::Other(tag) => tag,
        }
    }

    /// Parse a type tag. Unknown tags are kept as `Other`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "basic_summary" => Self::BasicSummary,
            "url_summary" => Self::UrlSummary,
            "advanced_summary" => Self::AdvancedSummary,
            "category_summary" => Self::CategorySummary,
            "chunk" => Self::Chunk,
            "category" => Self::Category,
            "user_recent" => Self::UserRecent,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built cache key: `casecrux:v1:{type}:{identifier}[:{options_hash}]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a type, a content identifier and the options that shaped the result.
    pub fn build(cache_type: &CacheType, identifier: &str, options: &CacheOptions) -> Self {
        let mut key = format!("{}:{}:{}:{}", NAMESPACE, KEY_VERSION, cache_type, identifier);

        if !options.is_empty() {
            let options_str = options
                .iter()
                .map(|(k, v)| format!("{}={}", k, option_value(v)))
                .collect::<Vec<_>>()
                .join("&");
            key.push(':');
            key.push_str(&md5_hex(options_str.as_bytes())[..8]);
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for logs and response metadata
    pub fn truncated(&self) -> String {
        let prefix: String = self.0.chars().take(32).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strings render bare, every other primitive as its JSON text.
fn option_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
