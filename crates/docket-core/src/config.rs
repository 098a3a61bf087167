//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the last used email, and cache tuning.
//!
//! Configuration is stored at `~/.config/docket/config.json`. The
//! `DOCKET_API_BASE_URL` environment variable overrides the stored base URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_BASE_URL;
use crate::cache::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL, MIN_SWEEP_INTERVAL};
use crate::query::{QueryConfig, RetryPolicy, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};

/// Application name used for config/data directory paths
const APP_NAME: &str = "docket";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_BASE_URL_ENV: &str = "DOCKET_API_BASE_URL";

/// Cache tuning, in milliseconds where a duration is meant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
    pub query_retries: u32,
    pub mutation_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let queries = RetryPolicy::queries();
        Self {
            stale_time_ms: DEFAULT_STALE_TIME.as_millis() as u64,
            gc_time_ms: DEFAULT_GC_TIME.as_millis() as u64,
            query_retries: queries.max_retries,
            mutation_retries: RetryPolicy::mutations().max_retries,
            retry_base_delay_ms: queries.base_delay.as_millis() as u64,
            retry_max_delay_ms: queries.max_delay.as_millis() as u64,
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
        }
    }
}

impl CacheSettings {
    pub fn query_config(&self) -> QueryConfig {
        let retry = RetryPolicy {
            max_retries: self.query_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        };
        QueryConfig::new()
            .with_stale_time(Duration::from_millis(self.stale_time_ms))
            .with_gc_time(Duration::from_millis(self.gc_time_ms))
            .with_retry(retry)
            .with_mutation_retry(retry.with_max_retries(self.mutation_retries))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Never below `MIN_SWEEP_INTERVAL`, so a zero in the file cannot stall
    /// the runtime with a busy sweep.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms).max(MIN_SWEEP_INTERVAL)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_email: Option<String>,
    pub cache: CacheSettings,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the persisted stores
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Effective API base URL: environment, then config, then the default.
    pub fn api_base_url(&self) -> Result<String> {
        let from_env = std::env::var(API_BASE_URL_ENV).ok();
        self.resolve_api_base_url(from_env.as_deref())
    }

    fn resolve_api_base_url(&self, from_env: Option<&str>) -> Result<String> {
        let url = from_env
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or(self.api_base_url.as_deref())
            .unwrap_or(DEFAULT_API_BASE_URL);
        reqwest::Url::parse(url).with_context(|| format!("Invalid API base URL: {}", url))?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert!(config.api_base_url.is_none());
        assert_eq!(config.cache, CacheSettings::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docket").join("config.json");
        let config = Config {
            api_base_url: Some("https://api.firm.test".to_string()),
            last_email: Some("ada@firm.test".to_string()),
            cache: CacheSettings {
                stale_time_ms: 1_000,
                ..CacheSettings::default()
            },
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.api_base_url, config.api_base_url);
        assert_eq!(loaded.last_email, config.last_email);
        assert_eq!(loaded.cache.stale_time_ms, 1_000);
        assert_eq!(loaded.cache.gc_time_ms, 600_000);
    }

    #[test]
    fn test_partial_cache_section_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"cache":{"query_retries":0}}"#).unwrap();
        let query = config.cache.query_config();
        assert_eq!(query.retry.max_retries, 0);
        assert_eq!(query.mutation_retry.max_retries, 1);
        assert_eq!(query.stale_time, DEFAULT_STALE_TIME);
        assert_eq!(config.cache.ttl(), DEFAULT_TTL);
    }

    #[test]
    fn test_zero_sweep_interval_clamped() {
        let config: Config = serde_json::from_str(r#"{"cache":{"sweep_interval_ms":0}}"#).unwrap();
        assert_eq!(config.cache.sweep_interval(), MIN_SWEEP_INTERVAL);

        let config: Config = serde_json::from_str(r#"{"cache":{"sweep_interval_ms":90000}}"#).unwrap();
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_api_base_url_precedence() {
        let mut config = Config::default();
        assert_eq!(config.resolve_api_base_url(None).unwrap(), DEFAULT_API_BASE_URL);

        config.api_base_url = Some("https://api.firm.test".to_string());
        assert_eq!(config.resolve_api_base_url(None).unwrap(), "https://api.firm.test");
        assert_eq!(config.resolve_api_base_url(Some("  ")).unwrap(), "https://api.firm.test");
        assert_eq!(
            config.resolve_api_base_url(Some("http://127.0.0.1:9000/api")).unwrap(),
            "http://127.0.0.1:9000/api"
        );
        assert!(config.resolve_api_base_url(Some("not a url")).is_err());
    }
}
