//! Configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Default AdSense account to use when a tool call does not name one.
    /// Accepts either a bare publisher id (`pub-123...`) or the full
    /// `accounts/pub-123...` resource name.
    pub default_account: Option<String>,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Upstream API configuration
    pub upstream: UpstreamConfig,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite cache database. Defaults to
    /// `<data dir>/adsense-mcp/cache.db`.
    pub path: Option<PathBuf>,
    /// Interval between background expired-entry sweeps. Zero disables
    /// the sweep task; `get` still ignores expired rows either way.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    /// Resolve the database path, falling back to the platform data dir.
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(ref p) = self.path {
            return Ok(p.clone());
        }
        let base = dirs::data_dir()
            .ok_or_else(|| Error::Config("Cannot determine data directory".to_string()))?;
        Ok(base.join("adsense-mcp").join("cache.db"))
    }
}

/// Rate limiting configuration (rolling-window throttle)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per window
    pub requests_per_minute: u32,
    /// Rolling window length
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Extra wait added past the window edge to avoid boundary races
    #[serde(with = "humantime_serde")]
    pub buffer: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 100,
            window: Duration::from_secs(60),
            buffer: Duration::from_millis(100),
        }
    }
}

/// Retry configuration (exponential backoff)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts (first try included)
    pub max_attempts: u32,
    /// Base backoff delay, doubled on each attempt
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Uniform random jitter added to each delay, `[0, jitter)`
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            jitter: Duration::from_millis(1000),
        }
    }
}

/// Upstream AdSense Management API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL
    pub base_url: String,
    /// OAuth access token. Supports a literal value or `env:VAR_NAME`.
    pub access_token: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://adsense.googleapis.com/v2".to_string(),
            access_token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl UpstreamConfig {
    /// Resolve the access token, expanding `env:VAR_NAME` references.
    pub fn resolve_token(&self) -> Result<String> {
        let raw = self
            .access_token
            .as_deref()
            .ok_or_else(|| Error::Config("No upstream access token configured".to_string()))?;

        if let Some(var) = raw.strip_prefix("env:") {
            std::env::var(var)
                .map_err(|_| Error::Config(format!("Environment variable not set: {var}")))
        } else {
            Ok(raw.to_string())
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (ADSENSE_MCP_ prefix)
        figment = figment.merge(Env::prefixed("ADSENSE_MCP_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_quota_constants() {
        let config = Config::default();
        assert_eq!(config.rate_limit.requests_per_minute, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.rate_limit.buffer, Duration::from_millis(100));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_delay, Duration::from_secs(32));
        assert_eq!(config.retry.jitter, Duration::from_millis(1000));
    }

    #[test]
    fn default_upstream_points_at_v2() {
        let config = Config::default();
        assert_eq!(config.upstream.base_url, "https://adsense.googleapis.com/v2");
        assert!(config.default_account.is_none());
    }

    #[test]
    fn token_literal_resolves() {
        let upstream = UpstreamConfig {
            access_token: Some("ya29.token".to_string()),
            ..UpstreamConfig::default()
        };
        assert_eq!(upstream.resolve_token().unwrap(), "ya29.token");
    }

    #[test]
    fn missing_token_is_config_error() {
        let upstream = UpstreamConfig::default();
        assert!(matches!(upstream.resolve_token(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml_roundtrip(&config);
        assert_eq!(yaml.retry.max_attempts, config.retry.max_attempts);
        assert_eq!(yaml.cache.sweep_interval, config.cache.sweep_interval);
    }

    fn serde_yaml_roundtrip(config: &Config) -> Config {
        let json = serde_json::to_value(config).unwrap();
        serde_json::from_value(json).unwrap()
    }
}
