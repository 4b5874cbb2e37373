//! Instagram Graph API publisher
//!
//! Publishing is two calls against the business account:
//!
//! 1. `POST /{user_id}/media` with `image_url` and `caption` creates a media
//!    container and returns its id
//! 2. `POST /{user_id}/media_publish` with `creation_id` publishes it
//!
//! Instagram only takes image posts, so records without a thumbnail are
//! skipped.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;

use super::{absolute_url, http_base, PublishError, PublishResult, Publisher, SocialPost};
use crate::config::SocialConfig;
use crate::utils::truncate_words;

/// Words of the post body included in the caption
pub const CAPTION_WORDS: usize = 30;

/// Graph API reply: an object id, or an error object
#[derive(Debug, Default, Deserialize)]
struct GraphReply {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
}

/// Instagram publisher for a business account
pub struct InstagramPublisher {
    client: Client,
    api_base: String,
    token: String,
    user_id: String,
    site_url: String,
}

impl InstagramPublisher {
    /// Build a publisher from configuration; `None` when disabled
    pub fn from_config(config: &SocialConfig, timeout: Duration) -> PublishResult<Option<Self>> {
        let Some((token, user_id)) = config.instagram() else {
            return Ok(None);
        };

        let api_base = http_base("instagram_api_base", &config.instagram_api_base)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PublishError::transport)?;

        Ok(Some(Self {
            client,
            api_base,
            token: token.to_string(),
            user_id: user_id.to_string(),
            site_url: config.site_url.trim_end_matches('/').to_string(),
        }))
    }

    /// Caption: title, the first thirty words, a pointer to the site and
    /// the tags as hashtags
    pub fn format_caption(&self, post: &SocialPost) -> String {
        let mut caption = format!(
            "{}\n\n{}\n\nFull story on our site (link in bio)",
            post.title.trim(),
            truncate_words(&post.text, CAPTION_WORDS)
        );

        let hashtags: Vec<String> = post
            .tags
            .iter()
            .map(|tag| tag.split_whitespace().collect::<String>())
            .filter(|tag| !tag.is_empty())
            .map(|tag| format!("#{tag}"))
            .collect();
        if !hashtags.is_empty() {
            caption.push_str("\n\n");
            caption.push_str(&hashtags.join(" "));
        }

        caption
    }

    fn edge_url(&self, edge: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.user_id, edge)
    }

    async fn post_form(&self, edge: &str, form: &[(&str, &str)]) -> PublishResult<String> {
        let response = self
            .client
            .post(self.edge_url(edge))
            .form(form)
            .send()
            .await
            .map_err(PublishError::transport)?;

        object_id(response).await
    }
}

/// Id from a Graph API reply, or the error it carries
async fn object_id(response: Response) -> PublishResult<String> {
    let status = response.status();
    let reply: GraphReply = response.json().await.unwrap_or_default();

    match reply.id {
        Some(id) if status.is_success() && !id.is_empty() => Ok(id),
        _ => Err(PublishError::Api {
            status: status.as_u16(),
            description: reply
                .error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "response carried no id".to_string()),
        }),
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn name(&self) -> &str {
        "instagram"
    }

    async fn publish(&self, post: &SocialPost) -> PublishResult<()> {
        let Some(image) = post.image_url.as_deref() else {
            tracing::debug!(post_id = post.post_id, "No thumbnail, skipping Instagram");
            return Ok(());
        };

        let image_url = absolute_url(&self.site_url, image);
        let caption = self.format_caption(post);

        let container = self
            .post_form(
                "media",
                &[
                    ("image_url", image_url.as_str()),
                    ("caption", caption.as_str()),
                    ("access_token", self.token.as_str()),
                ],
            )
            .await?;

        let media_id = self
            .post_form(
                "media_publish",
                &[
                    ("creation_id", container.as_str()),
                    ("access_token", self.token.as_str()),
                ],
            )
            .await?;

        tracing::info!(post_id = post.post_id, media_id = %media_id, "Posted to Instagram");
        Ok(())
    }
}
