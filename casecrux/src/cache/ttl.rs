//! Time-to-live tiers per cache type

use serde::{Deserialize, Serialize};

use super::key::CacheType;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// TTL tiers in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlPolicy {
    /// Complete summaries (also the fallback for unknown types)
    #[serde(default = "default_full_summary")]
    pub full_summary: u64,
    /// Partial and category-level summaries
    #[serde(default = "default_partial_summary")]
    pub partial_summary: u64,
    /// Chunk-level summaries, content addressed and reusable
    #[serde(default = "default_chunk_summary")]
    pub chunk_summary: u64,
    /// Category templates
    #[serde(default = "default_category_template")]
    pub category_template: u64,
    /// Per-user recent listings
    #[serde(default = "default_user_recent")]
    pub user_recent: u64,
}

fn default_full_summary() -> u64 {
    DAY
}

fn default_partial_summary() -> u64 {
    12 * HOUR
}

fn default_chunk_summary() -> u64 {
    7 * DAY
}

fn default_category_template() -> u64 {
    30 * DAY
}

fn default_user_recent() -> u64 {
    7 * DAY
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            full_summary: default_full_summary(),
            partial_summary: default_partial_summary(),
            chunk_summary: default_chunk_summary(),
            category_template: default_category_template(),
            user_recent: default_user_recent(),
        }
    }
}

impl TtlPolicy {
    /// TTL in seconds for entries of the given type
    pub fn ttl_for(&self, cache_type: &CacheType) -> u64 {
        match cache_type {
            CacheType::BasicSummary | CacheType::UrlSummary | CacheType::AdvancedSummary => {
                self.full_summary
            }
            CacheType::CategorySummary => self.partial_summary,
            CacheType::Chunk => self.chunk_summary,
            CacheType::Category => self.category_template,
            CacheType::UserRecent => self.user_recent,
            CacheType::Other(_) => self.full_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tiers() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for(&CacheType::BasicSummary), 86_400);
        assert_eq!(policy.ttl_for(&CacheType::UrlSummary), 86_400);
        assert_eq!(policy.ttl_for(&CacheType::CategorySummary), 43_200);
        assert_eq!(policy.ttl_for(&CacheType::Chunk), 604_800);
        assert_eq!(policy.ttl_for(&CacheType::Category), 2_592_000);
        assert_eq!(policy.ttl_for(&CacheType::UserRecent), 604_800);
    }

    #[test]
    fn test_unknown_type_uses_full_summary_tier() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.ttl_for(&CacheType::parse("something_new")), 86_400);
    }

    #[test]
    fn test_partial_override_from_toml() {
        let policy: TtlPolicy = toml::from_str("chunk_summary = 60").unwrap();
        assert_eq!(policy.chunk_summary, 60);
        assert_eq!(policy.full_summary, 86_400);
    }
}
