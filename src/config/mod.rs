//! Configuration management for syndic
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files. Every section has defaults, so a config file only needs to name
//! the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound accepted by the WordPress REST API for `per_page`
pub const MAX_BATCH_SIZE: u32 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Import behaviour
    pub importer: ImportConfig,

    /// Remote fetch configuration
    pub fetcher: FetcherConfig,

    /// LLM paraphrasing service
    pub paraphrase: ParaphraseConfig,

    /// Local media storage
    pub media: MediaConfig,

    /// Re-arm delays and lock settings
    pub scheduler: SchedulerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Run-lock / pause-flag state store
    pub state: StateConfig,

    /// Social cross-posting
    pub social: SocialConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Import behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Posts requested per page (`per_page`)
    pub batch_size: u32,

    /// Rewrite title/content/excerpt through the paraphrase API
    pub paraphrase_enabled: bool,

    /// Consecutive fetch failures before a source moves to `error`
    pub max_errors: u32,

    /// Local category for unmapped remote categories
    pub default_category: Option<i64>,

    /// Author id assigned to imported records
    pub default_author: i64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            paraphrase_enabled: true,
            max_errors: 3,
            default_category: None,
            default_author: 1,
        }
    }
}

/// Remote fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,

    /// Rate limit (requests per second)
    pub requests_per_second: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            user_agent: String::from(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
            requests_per_second: 2,
        }
    }
}

/// LLM paraphrasing service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParaphraseConfig {
    /// OpenAI-compatible API base URL
    pub endpoint: String,

    /// Bearer API key
    pub api_key: Option<String>,

    /// Model name
    pub model: String,

    /// Response token ceiling
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ParaphraseConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("https://api.openai.com/v1"),
            api_key: None,
            model: String::from("gpt-4"),
            max_tokens: 4000,
            temperature: 0.7,
            timeout_secs: 60,
        }
    }
}

/// Local media storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Root directory for stored files
    pub storage_dir: PathBuf,

    /// Public URL prefix of `storage_dir`
    pub public_base_url: String,

    /// Download timeout in seconds
    pub download_timeout_secs: u64,

    /// Largest asset accepted, in bytes
    pub max_file_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("data/media"),
            public_base_url: String::from("/media"),
            download_timeout_secs: 60,
            max_file_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Re-arm delays and lock settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay when a source has more pages pending
    pub more_pages_delay_secs: u64,

    /// Delay when every source is caught up
    pub monitoring_delay_secs: u64,

    /// Delay after a caught error
    pub error_delay_secs: u64,

    /// Run-lock expiry ceiling
    pub lock_ttl_secs: u64,

    /// How often the daemon re-reads the state store
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            more_pages_delay_secs: 5,
            monitoring_delay_secs: 300,
            error_delay_secs: 300,
            lock_ttl_secs: 3600,
            poll_interval_secs: 10,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/syndic.db"),
        }
    }
}

/// Which state store backs the run lock and pause flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Sqlite,
    Redis,
}

impl FromStr for StateBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(format!("Unknown state backend: {other}")),
        }
    }
}

/// Run-lock / pause-flag state store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub backend: StateBackend,

    /// Redis connection URL (redis backend only)
    pub redis_url: String,

    /// Key prefix for every state key
    pub key_prefix: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Sqlite,
            redis_url: String::from("redis://127.0.0.1:6379"),
            key_prefix: String::from("syndic:"),
        }
    }
}

/// Social cross-posting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    /// Master switch
    pub enabled: bool,

    /// Telegram bot token
    pub telegram_token: Option<String>,

    /// Telegram channel (`@name` or numeric id)
    pub telegram_channel: Option<String>,

    /// Bot API base URL
    pub telegram_api_base: String,

    /// Instagram Graph API access token
    pub instagram_token: Option<String>,

    /// Instagram business account id
    pub instagram_user_id: Option<String>,

    /// Graph API base URL, including the version
    pub instagram_api_base: String,

    /// Public site URL used to build record links
    pub site_url: String,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            telegram_token: None,
            telegram_channel: None,
            telegram_api_base: String::from("https://api.telegram.org"),
            instagram_token: None,
            instagram_user_id: None,
            instagram_api_base: String::from("https://graph.facebook.com/v13.0"),
            site_url: String::from("http://localhost"),
        }
    }
}

impl SocialConfig {
    /// Telegram credentials, when cross-posting is switched on and configured
    pub fn telegram(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        match (self.telegram_token.as_deref(), self.telegram_channel.as_deref()) {
            (Some(token), Some(channel)) if !token.is_empty() && !channel.is_empty() => {
                Some((token, channel))
            }
            _ => None,
        }
    }

    /// Instagram credentials (token, account id), when switched on and configured
    pub fn instagram(&self) -> Option<(&str, &str)> {
        if !self.enabled {
            return None;
        }
        match (self.instagram_token.as_deref(), self.instagram_user_id.as_deref()) {
            (Some(token), Some(user)) if !token.is_empty() && !user.is_empty() => {
                Some((token, user))
            }
            _ => None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Activity log retention in days
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
            retention_days: 30,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset variables keep their defaults. The paraphrase key also falls back
    /// to `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("SYNDIC_BATCH_SIZE") {
            config.importer.batch_size = v;
        }
        if let Some(v) = env_parse("SYNDIC_PARAPHRASE_ENABLED") {
            config.importer.paraphrase_enabled = v;
        }
        if let Some(v) = env_parse("SYNDIC_MAX_ERRORS") {
            config.importer.max_errors = v;
        }
        if let Some(v) = env_parse("SYNDIC_DEFAULT_CATEGORY") {
            config.importer.default_category = Some(v);
        }
        if let Some(v) = env_parse("SYNDIC_DEFAULT_AUTHOR") {
            config.importer.default_author = v;
        }

        if let Some(v) = env_parse("SYNDIC_REQUEST_TIMEOUT") {
            config.fetcher.request_timeout_secs = v;
        }
        if let Some(v) = env_string("SYNDIC_USER_AGENT") {
            config.fetcher.user_agent = v;
        }
        if let Some(v) = env_parse("SYNDIC_RATE_LIMIT") {
            config.fetcher.requests_per_second = v;
        }

        if let Some(v) = env_string("SYNDIC_PARAPHRASE_ENDPOINT") {
            config.paraphrase.endpoint = v;
        }
        config.paraphrase.api_key =
            env_string("SYNDIC_PARAPHRASE_API_KEY").or_else(|| env_string("OPENAI_API_KEY"));
        if let Some(v) = env_string("SYNDIC_PARAPHRASE_MODEL") {
            config.paraphrase.model = v;
        }

        if let Some(v) = env_string("SYNDIC_MEDIA_DIR") {
            config.media.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = env_string("SYNDIC_MEDIA_BASE_URL") {
            config.media.public_base_url = v;
        }
        if let Some(v) = env_parse("SYNDIC_MEDIA_MAX_FILE_BYTES") {
            config.media.max_file_bytes = v;
        }

        if let Some(v) = env_string("SYNDIC_SQLITE_PATH") {
            config.database.sqlite_path = PathBuf::from(v);
        }

        if let Some(v) = env_string("SYNDIC_STATE_BACKEND") {
            config.state.backend = v
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid SYNDIC_STATE_BACKEND")?;
        }
        if let Some(v) = env_string("REDIS_URL") {
            config.state.redis_url = v;
        }

        config.social.telegram_token = env_string("SYNDIC_TELEGRAM_TOKEN");
        config.social.telegram_channel = env_string("SYNDIC_TELEGRAM_CHANNEL");
        config.social.instagram_token = env_string("SYNDIC_INSTAGRAM_TOKEN");
        config.social.instagram_user_id = env_string("SYNDIC_INSTAGRAM_USER_ID");
        config.social.enabled =
            config.social.telegram_token.is_some() || config.social.instagram_token.is_some();
        if let Some(v) = env_string("SYNDIC_SITE_URL") {
            config.social.site_url = v;
        }

        if let Some(v) = env_string("SYNDIC_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = env_string("SYNDIC_LOG_FORMAT") {
            config.logging.format = v;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.importer.batch_size == 0 || self.importer.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!("batch_size must be between 1 and {MAX_BATCH_SIZE}");
        }

        if self.importer.max_errors == 0 {
            anyhow::bail!("max_errors must be greater than 0");
        }

        if self.fetcher.requests_per_second == 0 {
            anyhow::bail!("requests_per_second must be greater than 0");
        }

        if self.fetcher.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.media.max_file_bytes == 0 {
            anyhow::bail!("media.max_file_bytes must be greater than 0");
        }

        if !(0.0..=2.0).contains(&self.paraphrase.temperature) {
            anyhow::bail!("temperature must be within 0.0..=2.0");
        }

        if self.scheduler.lock_ttl_secs == 0 {
            anyhow::bail!("lock_ttl_secs must be greater than 0");
        }

        if self.scheduler.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than 0");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get fetch timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetcher.request_timeout_secs)
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn more_pages_delay(&self) -> Duration {
        Duration::from_secs(self.more_pages_delay_secs)
    }

    #[must_use]
    pub fn monitoring_delay(&self) -> Duration {
        Duration::from_secs(self.monitoring_delay_secs)
    }

    #[must_use]
    pub fn error_delay(&self) -> Duration {
        Duration::from_secs(self.error_delay_secs)
    }

    #[must_use]
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.importer.batch_size, 5);
        assert_eq!(config.importer.max_errors, 3);
        assert_eq!(config.paraphrase.max_tokens, 4000);
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut config = Config::default();
        config.importer.batch_size = 0;
        assert!(config.validate().is_err());

        config.importer.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = String::from("xml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scheduler_durations() {
        let config = Config::default();
        assert_eq!(config.scheduler.more_pages_delay(), Duration::from_secs(5));
        assert_eq!(config.scheduler.monitoring_delay(), Duration::from_secs(300));
        assert_eq!(config.scheduler.lock_ttl(), Duration::from_secs(3600));
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [importer]
            batch_size = 20
            default_category = 7

            [state]
            backend = "redis"
            "#,
        )
        .unwrap();

        assert_eq!(config.importer.batch_size, 20);
        assert_eq!(config.importer.default_category, Some(7));
        assert!(config.importer.paraphrase_enabled);
        assert_eq!(config.state.backend, StateBackend::Redis);
        assert_eq!(config.scheduler.monitoring_delay_secs, 300);
    }

    #[test]
    fn test_telegram_requires_enabled_and_credentials() {
        let mut social = SocialConfig::default();
        social.telegram_token = Some("123:abc".into());
        social.telegram_channel = Some("@news".into());
        assert!(social.telegram().is_none());

        social.enabled = true;
        assert_eq!(social.telegram(), Some(("123:abc", "@news")));

        social.telegram_channel = Some(String::new());
        assert!(social.telegram().is_none());

        assert!(social.instagram().is_none());
        social.instagram_token = Some("EAAB".into());
        social.instagram_user_id = Some("1784".into());
        assert_eq!(social.instagram(), Some(("EAAB", "1784")));
    }
}
