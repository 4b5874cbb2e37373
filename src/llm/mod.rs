//! LLM client for paraphrasing imported text
//!
//! This module talks to an OpenAI-compatible `chat/completions` endpoint
//! and asks the model to rewrite a piece of text while keeping its HTML
//! markup intact.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ParaphraseConfig;
use crate::utils::error::ParaphraseError;

const SYSTEM_PROMPT: &str =
    "You are a professional rewriter. Rephrase the text, preserving HTML tags and structure.";

const USER_PROMPT: &str = "Rephrase the following text, preserving its meaning and HTML formatting. \
     Make the text unique: \n\n";

/// Text rewriting service
#[async_trait]
pub trait Paraphraser: Send + Sync {
    /// Rewrite `text`, preserving its markup
    async fn rewrite(&self, text: &str) -> Result<String, ParaphraseError>;
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat completion response (only the fields we read)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible paraphraser
pub struct ChatParaphraser {
    client: Client,
    config: ParaphraseConfig,
}

impl ChatParaphraser {
    /// Create a new paraphraser with custom config
    pub fn with_config(config: ParaphraseConfig) -> Result<Self, ParaphraseError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    /// Strip a markdown code fence wrapping the whole reply
    fn unwrap_code_fence(text: &str) -> &str {
        let trimmed = text.trim();
        let Some(inner) = trimmed
            .strip_prefix("```")
            .and_then(|rest| rest.strip_suffix("```"))
        else {
            return trimmed;
        };

        // Skip language identifier if present
        match inner.find('\n') {
            Some(newline) if !inner[..newline].contains('<') => inner[newline + 1..].trim(),
            _ => inner.trim(),
        }
    }
}

#[async_trait]
impl Paraphraser for ChatParaphraser {
    async fn rewrite(&self, text: &str) -> Result<String, ParaphraseError> {
        if text.trim().is_empty() {
            return Err(ParaphraseError::EmptyInput);
        }

        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ParaphraseError::MissingApiKey)?;

        let user_prompt = format!("{USER_PROMPT}{text}");
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ParaphraseError::Api {
                status,
                body: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ParaphraseError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ParaphraseError::InvalidResponse("no choices in response".into()))?;

        let rewritten = Self::unwrap_code_fence(&content);
        if rewritten.is_empty() {
            return Err(ParaphraseError::InvalidResponse("empty completion".into()));
        }

        tracing::debug!(
            input_chars = text.len(),
            output_chars = rewritten.len(),
            "Paraphrased text"
        );
        Ok(rewritten.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paraphraser(api_key: Option<&str>) -> ChatParaphraser {
        ChatParaphraser::with_config(ParaphraseConfig {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = ParaphraseConfig::default();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.max_tokens, 4000);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unwrap_code_fence() {
        assert_eq!(
            ChatParaphraser::unwrap_code_fence("```html\n<p>Hi</p>\n```"),
            "<p>Hi</p>"
        );
        assert_eq!(ChatParaphraser::unwrap_code_fence("```<p>Hi</p>```"), "<p>Hi</p>");
        assert_eq!(ChatParaphraser::unwrap_code_fence("  plain  "), "plain");
        assert_eq!(
            ChatParaphraser::unwrap_code_fence("a ```b``` c"),
            "a ```b``` c"
        );
    }

    #[test]
    fn test_completions_url() {
        let mut p = paraphraser(None);
        p.config.endpoint = "http://localhost:9000/v1/".into();
        assert_eq!(p.completions_url(), "http://localhost:9000/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_empty_input_is_never_sent() {
        let p = paraphraser(Some("key"));
        assert!(matches!(
            p.rewrite("   ").await,
            Err(ParaphraseError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let p = paraphraser(None);
        assert!(matches!(
            p.rewrite("text").await,
            Err(ParaphraseError::MissingApiKey)
        ));
    }
}
