//! Cross-posting of imported posts to social channels
//!
//! Telegram and Instagram are supported. Publishers are optional: a channel
//! without credentials is simply not built, and the importer skips
//! cross-posting when none is configured.
//!
//! - [`telegram`] - Bot API `sendPhoto` / `sendMessage`
//! - [`instagram`] - Graph API media container + `media_publish`

pub mod instagram;
pub mod telegram;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SocialConfig;

pub use instagram::InstagramPublisher;
pub use telegram::TelegramPublisher;

/// Result type for publisher operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while cross-posting
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// HTTP request failed; the request URL is stripped
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The API answered with an error
    #[error("API error (status {status}): {description}")]
    Api { status: u16, description: String },

    /// Invalid publisher configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PublishError {
    /// Wrap a transport error
    ///
    /// Bot API URLs embed the bot token, so the URL never reaches the
    /// error message.
    pub fn transport(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }

    /// Check if the failure is transient
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            Self::InvalidConfig(_) => false,
        }
    }
}

/// A freshly imported post to announce
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialPost {
    pub post_id: i64,
    pub title: String,
    /// Plain-text body
    pub text: String,
    /// Public URL of the post thumbnail, absolute or site-relative
    pub image_url: Option<String>,
    /// Local tag names
    pub tags: Vec<String>,
}

/// Cross-posting channel
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, post: &SocialPost) -> PublishResult<()>;
}

/// Every configured channel, Telegram first
pub fn publishers_from_config(
    config: &SocialConfig,
    timeout: Duration,
) -> PublishResult<Vec<Arc<dyn Publisher>>> {
    let mut publishers: Vec<Arc<dyn Publisher>> = Vec::new();
    if let Some(telegram) = TelegramPublisher::from_config(config, timeout)? {
        publishers.push(Arc::new(telegram));
    }
    if let Some(instagram) = InstagramPublisher::from_config(config, timeout)? {
        publishers.push(Arc::new(instagram));
    }
    Ok(publishers)
}

fn http_base(name: &str, value: &str) -> PublishResult<String> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(PublishError::InvalidConfig(format!(
            "{name} must be an http(s) URL: {value}"
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

/// Make a site-relative URL absolute against `site_url`
fn absolute_url(site_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", site_url, url.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            absolute_url("https://mysite.example", "/media/2024/01/cat.jpg"),
            "https://mysite.example/media/2024/01/cat.jpg"
        );
        assert_eq!(
            absolute_url("https://mysite.example", "https://cdn.example/a.jpg"),
            "https://cdn.example/a.jpg"
        );
    }

    #[test]
    fn test_publishers_from_config() {
        let mut config = SocialConfig {
            enabled: true,
            telegram_token: Some("1:a".into()),
            telegram_channel: Some("@c".into()),
            ..Default::default()
        };
        let timeout = Duration::from_secs(1);
        let names: Vec<String> = publishers_from_config(&config, timeout)
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["telegram"]);

        config.instagram_token = Some("EAAB".into());
        config.instagram_user_id = Some("1784".into());
        assert_eq!(publishers_from_config(&config, timeout).unwrap().len(), 2);

        config.enabled = false;
        assert!(publishers_from_config(&config, timeout).unwrap().is_empty());
    }

    #[test]
    fn test_api_error_recoverability() {
        let rate_limited = PublishError::Api {
            status: 429,
            description: "Too Many Requests".into(),
        };
        assert!(rate_limited.is_recoverable());
        assert!(!PublishError::InvalidConfig("x".into()).is_recoverable());
    }
}
