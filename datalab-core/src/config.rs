//! Data configuration: cache location, per-source defaults, HTTP behavior.
//!
//! Stored as TOML. Every field has a default, so an empty file (or no file)
//! is a valid configuration. The news API key can come from the
//! `NEWSAPI_API_KEY` environment variable, which overrides the file.

use crate::domain::Interval;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the news API key.
pub const NEWS_API_KEY_ENV: &str = "NEWSAPI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the on-disk cache. Each source writes to its own subdirectory.
    pub cache_dir: PathBuf,
    pub prices: PriceSettings,
    pub trends: TrendSettings,
    pub news: NewsSettings,
    pub http: HttpSettings,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("data"),
            prices: PriceSettings::default(),
            trends: TrendSettings::default(),
            news: NewsSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceSettings {
    pub interval: Interval,
    pub tickers: Vec<String>,
    /// Tickers per provider call.
    pub chunk_size: usize,
    pub delay_ms: u64,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            interval: Interval::DAILY,
            tickers: vec!["BTC-USD".into()],
            chunk_size: 10,
            delay_ms: 1000,
        }
    }
}

impl PriceSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    pub keywords: Vec<String>,
    /// Keywords per call; capped by the provider's own limit.
    pub chunk_size: usize,
    pub delay_ms: u64,
    /// Host language sent to the trends service.
    pub hl: String,
    /// Timezone offset in minutes sent to the trends service.
    pub tz: i32,
    /// Geography filter; empty means worldwide.
    pub geo: String,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            keywords: vec!["bitcoin".into()],
            chunk_size: 5,
            delay_ms: 15_000,
            hl: "en-US".into(),
            tz: 360,
            geo: String::new(),
        }
    }
}

impl TrendSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsSettings {
    pub query: String,
    pub language: String,
    pub page_size: u32,
    pub delay_ms: u64,
    /// Usually left unset in the file and supplied via `NEWSAPI_API_KEY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            query: "Bitcoin".into(),
            language: "en".into(),
            page_size: 100,
            delay_ms: 1000,
            api_key: None,
        }
    }
}

impl NewsSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_failure_threshold: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            base_delay_ms: 500,
            breaker_cooldown_secs: 30 * 60,
            breaker_failure_threshold: 3,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.breaker_cooldown_secs)
    }
}

impl DataConfig {
    /// Load from a TOML file, apply environment overrides, validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)?
            .with_env_overrides()
            .validated()
    }

    /// Parse a TOML string. No environment overrides are applied.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `NEWSAPI_API_KEY` when set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        let key = std::env::var(NEWS_API_KEY_ENV).ok();
        self.with_api_key_override(key)
    }

    fn with_api_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.news.api_key = Some(key);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prices.chunk_size == 0 {
            return Err(ConfigError::Invalid("prices.chunk_size must be at least 1".into()));
        }
        if self.trends.chunk_size == 0 {
            return Err(ConfigError::Invalid("trends.chunk_size must be at least 1".into()));
        }
        if self.news.page_size == 0 || self.news.page_size > 100 {
            return Err(ConfigError::Invalid("news.page_size must be in 1..=100".into()));
        }
        if self.news.query.trim().is_empty() {
            return Err(ConfigError::Invalid("news.query must not be empty".into()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache_dir must not be empty".into()));
        }
        Ok(())
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }
}
