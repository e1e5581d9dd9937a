//! Client and fallback policy for the external ML summarization service

mod client;
mod error;
pub mod fallback;
mod proxy;

pub use client::MlClient;
pub use error::{FailureKind, UpstreamFailure};
pub use proxy::{proxy_reply, relay_reply, with_request_context};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream ML service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the ML service. Override with ML_SERVICE_URL env var
    #[serde(default = "default_url")]
    pub url: String,

    /// Deployment mode; demo fallbacks are only synthesized outside production.
    /// Override with CASECRUX_ENV env var
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Where `url` came from, reported by diagnostics
    #[serde(skip)]
    pub url_source: UrlSource,
}

fn default_url() -> String {
    "https://casecrux.onrender.com".to_string()
}

fn default_user_agent() -> String {
    "CaseCrux-Server/1.0".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            environment: Environment::default(),
            timeouts: TimeoutConfig::default(),
            user_agent: default_user_agent(),
            url_source: UrlSource::Default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse a mode name. Anything that is not clearly development is treated as production.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "development" | "dev" | "local" => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    /// Whether upstream outages may be answered with demo payloads
    pub fn allows_fallback(&self) -> bool {
        matches!(self, Self::Development)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UrlSource {
    #[default]
    Default,
    Config,
    Environment,
}

/// Timeout tiers in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Health probes, listings, capability queries
    #[serde(default = "default_quick_secs")]
    pub quick_secs: u64,
    /// Single-document summarization
    #[serde(default = "default_document_secs")]
    pub document_secs: u64,
    /// URL batches, advanced and category summaries
    #[serde(default = "default_extended_secs")]
    pub extended_secs: u64,
    /// Whole-category analysis and downloads
    #[serde(default = "default_heavy_secs")]
    pub heavy_secs: u64,
}

fn default_quick_secs() -> u64 {
    30
}

fn default_document_secs() -> u64 {
    120
}

fn default_extended_secs() -> u64 {
    300
}

fn default_heavy_secs() -> u64 {
    600
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick_secs: default_quick_secs(),
            document_secs: default_document_secs(),
            extended_secs: default_extended_secs(),
            heavy_secs: default_heavy_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutTier {
    Quick,
    Document,
    Extended,
    Heavy,
}

impl TimeoutConfig {
    pub fn for_tier(&self, tier: TimeoutTier) -> Duration {
        let secs = match tier {
            TimeoutTier::Quick => self.quick_secs,
            TimeoutTier::Document => self.document_secs,
            TimeoutTier::Extended => self.extended_secs,
            TimeoutTier::Heavy => self.heavy_secs,
        };
        Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_names() {
        assert_eq!(Environment::from_name("development"), Environment::Development);
        assert_eq!(Environment::from_name(""), Environment::Development);
        assert_eq!(Environment::from_name("Production"), Environment::Production);
        assert_eq!(Environment::from_name("staging"), Environment::Production);
        assert!(Environment::Development.allows_fallback());
        assert!(!Environment::Production.allows_fallback());
    }

    #[test]
    fn test_timeout_tiers_are_ordered() {
        let t = TimeoutConfig::default();
        assert_eq!(t.for_tier(TimeoutTier::Quick), Duration::from_secs(30));
        assert!(t.for_tier(TimeoutTier::Quick) < t.for_tier(TimeoutTier::Document));
        assert!(t.for_tier(TimeoutTier::Document) < t.for_tier(TimeoutTier::Extended));
        assert_eq!(t.for_tier(TimeoutTier::Heavy), Duration::from_secs(600));
    }
}
