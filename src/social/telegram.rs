//! Telegram Bot API publisher

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::{absolute_url, http_base, PublishError, PublishResult, Publisher, SocialPost};
use crate::config::SocialConfig;
use crate::utils::truncate_words;

/// Words of the post body included in the message
pub const SUMMARY_WORDS: usize = 50;

/// Bot API reply envelope
#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API publisher
///
/// Posts with `sendPhoto` when the item has a thumbnail, otherwise with
/// `sendMessage`. Messages use HTML parse mode:
///
/// ```text
/// <b>Title</b>
///
/// First fifty words of the post...
///
/// https://site.example/?p=42
/// ```
pub struct TelegramPublisher {
    client: Client,
    api_base: String,
    token: String,
    channel: String,
    site_url: String,
}

impl TelegramPublisher {
    /// Build a publisher from configuration; `None` when disabled
    pub fn from_config(config: &SocialConfig, timeout: Duration) -> PublishResult<Option<Self>> {
        let Some((token, channel)) = config.telegram() else {
            return Ok(None);
        };

        let api_base = http_base("telegram_api_base", &config.telegram_api_base)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::transport)?;

        Ok(Some(Self {
            client,
            api_base,
            token: token.to_string(),
            channel: channel.to_string(),
            site_url: config.site_url.trim_end_matches('/').to_string(),
        }))
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Public link of a local record
    pub fn post_link(&self, post_id: i64) -> String {
        format!("{}/?p={}", self.site_url, post_id)
    }

    /// Message body in Telegram HTML
    pub fn format_message(&self, post: &SocialPost) -> String {
        format!(
            "<b>{}</b>\n\n{}\n\n{}",
            html_escape::encode_text(post.title.trim()),
            html_escape::encode_text(&truncate_words(&post.text, SUMMARY_WORDS)),
            self.post_link(post.post_id)
        )
    }
}

#[async_trait]
impl Publisher for TelegramPublisher {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn publish(&self, post: &SocialPost) -> PublishResult<()> {
        let text = self.format_message(post);

        let (method, payload) = match post.image_url.as_deref() {
            Some(image) => (
                "sendPhoto",
                serde_json::json!({
                    "chat_id": self.channel,
                    "photo": absolute_url(&self.site_url, image),
                    "caption": text,
                    "parse_mode": "HTML",
                }),
            ),
            None => (
                "sendMessage",
                serde_json::json!({
                    "chat_id": self.channel,
                    "text": text,
                    "parse_mode": "HTML",
                }),
            ),
        };

        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(PublishError::transport)?;

        let status = response.status();
        let reply: Option<TelegramReply> = response.json().await.ok();

        match reply {
            Some(reply) if status.is_success() && reply.ok => {
                tracing::info!(post_id = post.post_id, method, "Posted to Telegram");
                Ok(())
            }
            reply => Err(PublishError::Api {
                status: status.as_u16(),
                description: reply
                    .and_then(|r| r.description)
                    .unwrap_or_else(|| "unexpected response".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SocialConfig {
        SocialConfig {
            enabled: true,
            telegram_token: Some("123:abc".into()),
            telegram_channel: Some("@news".into()),
            telegram_api_base: "https://api.telegram.org/".into(),
            site_url: "https://mysite.example/".into(),
            ..Default::default()
        }
    }

    fn publisher() -> TelegramPublisher {
        TelegramPublisher::from_config(&config(), Duration::from_secs(5))
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_disabled_builds_nothing() {
        let disabled = SocialConfig {
            enabled: false,
            ..config()
        };
        assert!(TelegramPublisher::from_config(&disabled, Duration::from_secs(5))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_api_base() {
        let bad = SocialConfig {
            telegram_api_base: "api.telegram.org".into(),
            ..config()
        };
        assert!(matches!(
            TelegramPublisher::from_config(&bad, Duration::from_secs(5)),
            Err(PublishError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_urls() {
        let p = publisher();
        assert_eq!(
            p.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
        assert_eq!(p.post_link(42), "https://mysite.example/?p=42");
    }

    #[test]
    fn test_format_message() {
        let p = publisher();
        let body: Vec<String> = (1..=60).map(|i| format!("w{i}")).collect();
        let post = SocialPost {
            post_id: 7,
            title: "Tom & Jerry".into(),
            text: body.join(" "),
            ..Default::default()
        };

        let message = p.format_message(&post);
        assert!(message.starts_with("<b>Tom &amp; Jerry</b>\n\n"));
        assert!(message.contains("w50..."));
        assert!(!message.contains("w51"));
        assert!(message.ends_with("https://mysite.example/?p=7"));
    }
}
