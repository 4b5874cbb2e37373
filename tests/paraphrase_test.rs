//! Integration tests for ChatParaphraser using wiremock

mod common;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{completion, COMPLETIONS_PATH};
use syndic::config::ParaphraseConfig;
use syndic::llm::{ChatParaphraser, Paraphraser};
use syndic::utils::error::ParaphraseError;

fn paraphraser(server: &MockServer, api_key: Option<&str>) -> ChatParaphraser {
    ChatParaphraser::with_config(ParaphraseConfig {
        endpoint: format!("{}/v1/", server.uri()),
        api_key: api_key.map(str::to_string),
        model: "gpt-test".to_string(),
        max_tokens: 256,
        temperature: 0.5,
        timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn test_rewrite_sends_chat_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "max_tokens": 256,
            "messages": [{ "role": "system" }, { "role": "user" }],
        })))
        .and(body_string_contains("<p>Rates rose today.</p>"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("<p>Today rates went up.</p>")))
        .expect(1)
        .mount(&server)
        .await;

    let rewritten = paraphraser(&server, Some("sk-test"))
        .rewrite("<p>Rates rose today.</p>")
        .await
        .unwrap();

    assert_eq!(rewritten, "<p>Today rates went up.</p>");
}

#[tokio::test]
async fn test_rewrite_unwraps_code_fence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("```html\n<p>Fenced</p>\n```")),
        )
        .mount(&server)
        .await;

    let rewritten = paraphraser(&server, Some("sk-test"))
        .rewrite("<p>Original</p>")
        .await
        .unwrap();
    assert_eq!(rewritten, "<p>Fenced</p>");
}

#[tokio::test]
async fn test_rewrite_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = paraphraser(&server, Some("sk-test"))
        .rewrite("text")
        .await
        .unwrap_err();

    match &err {
        ParaphraseError::Api { status, body } => {
            assert_eq!(*status, 429);
            assert_eq!(body, "rate limited");
        }
        other => panic!("Expected API error, got {other:?}"),
    }
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_rewrite_without_choices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let err = paraphraser(&server, Some("sk-test"))
        .rewrite("text")
        .await
        .unwrap_err();
    assert!(matches!(err, ParaphraseError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_rewrite_requires_key_and_input() {
    let server = MockServer::start().await;
    let without_key = paraphraser(&server, None);

    assert!(matches!(
        without_key.rewrite("text").await,
        Err(ParaphraseError::MissingApiKey)
    ));
    assert!(matches!(
        paraphraser(&server, Some("sk-test")).rewrite("   ").await,
        Err(ParaphraseError::EmptyInput)
    ));

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}
