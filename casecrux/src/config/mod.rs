//! Configuration management for the CaseCrux gateway
//!
//! Loaded from a TOML file, then overridden from the environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::CacheConfig;
use crate::upstream::{Environment, UpstreamConfig, UrlSource};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum request body size in bytes (default: 50MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_max_body_size() -> usize {
    50 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin, or list specific origins.
    #[serde(default = "default_cors_origins")]
    pub origins: Vec<String>,
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:5173".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,casecrux=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let home = || {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".into()))
    };
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        Ok(home()?.join(rest))
    } else if s == "~" {
        home()
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from `config_path`, writing the defaults there if it does not exist
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        let config_path = config_path.as_path();
        let existed = config_path.exists();
        let mut config = if existed {
            let content = fs::read_to_string(config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = config.save(config_path) {
                tracing::warn!("Could not write default config to {:?}: {}", config_path, e);
            }
            config
        };

        if existed && config.upstream.url != UpstreamConfig::default().url {
            config.upstream.url_source = UrlSource::Config;
        }
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides. `var` returns the value of a variable, if set.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(env) = var("CASECRUX_ENV") {
            self.upstream.environment = Environment::from_name(&env);
        }
        if let Some(url) = var("ML_SERVICE_URL") {
            self.upstream.url = url;
            self.upstream.url_source = UrlSource::Environment;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(level) = var("RUST_LOG") {
            self.observability.log_level = level;
        }

        if self.cache.url.is_none() {
            self.cache.url = resolve_redis_url(self.upstream.environment, &var);
        }
    }
}

/// Pick the Redis URL for the environment.
///
/// Production uses the production URL, then the generic one. Development prefers a
/// local instance and falls back the same way.
pub fn resolve_redis_url<F>(environment: Environment, var: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let candidates: &[&str] = match environment {
        Environment::Production => &["REDIS_URL_PRODUCTION", "REDIS_URL"],
        Environment::Development => &["REDIS_URL_LOCAL", "REDIS_URL_PRODUCTION", "REDIS_URL"],
    };
    candidates.iter().find_map(|name| var(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr, "127.0.0.1:5000");
        assert_eq!(config.server.max_body_size, 50 * 1024 * 1024);
        assert_eq!(config.upstream.environment, Environment::Development);
        assert!(config.cache.enabled);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("CASECRUX_ENV", "production"),
            ("ML_SERVICE_URL", "http://ml.internal:8000"),
            ("LOG_FORMAT", "json"),
            ("REDIS_URL_LOCAL", "redis://localhost:6379"),
            ("REDIS_URL", "redis://shared:6379"),
        ]));
        assert_eq!(config.upstream.environment, Environment::Production);
        assert_eq!(config.upstream.url, "http://ml.internal:8000");
        assert_eq!(config.upstream.url_source, UrlSource::Environment);
        assert_eq!(config.observability.log_format, "json");
        assert_eq!(config.cache.url.as_deref(), Some("redis://shared:6379"));
    }

    #[test]
    fn test_redis_url_resolution_order() {
        let all = env(&[
            ("REDIS_URL_LOCAL", "redis://local"),
            ("REDIS_URL_PRODUCTION", "redis://prod"),
            ("REDIS_URL", "redis://generic"),
        ]);
        assert_eq!(
            resolve_redis_url(Environment::Development, &all).as_deref(),
            Some("redis://local")
        );
        assert_eq!(
            resolve_redis_url(Environment::Production, &all).as_deref(),
            Some("redis://prod")
        );

        let generic = env(&[("REDIS_URL", "redis://generic")]);
        assert_eq!(
            resolve_redis_url(Environment::Development, &generic).as_deref(),
            Some("redis://generic")
        );
        assert_eq!(resolve_redis_url(Environment::Production, env(&[])), None);
    }

    #[test]
    fn test_explicit_cache_url_wins() {
        let mut config = Config::default();
        config.cache.url = Some("redis://configured".to_string());
        config.apply_env(env(&[("REDIS_URL", "redis://generic")]));
        assert_eq!(config.cache.url.as_deref(), Some("redis://configured"));
    }

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_tilde(Path::new("~/.casecrux/casecrux.toml")).unwrap(),
            home.join(".casecrux/casecrux.toml")
        );
        assert_eq!(expand_tilde(Path::new("~")).unwrap(), home);
        assert_eq!(
            expand_tilde(Path::new("conf/casecrux.toml")).unwrap(),
            PathBuf::from("conf/casecrux.toml")
        );
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("ML_SERVICE_URL", "  "), ("CASECRUX_ENV", "")]));
        assert_eq!(config.upstream.url, "https://casecrux.onrender.com");
        assert_eq!(config.upstream.url_source, UrlSource::Default);
    }
}
