//! Integration tests for the Telegram and Instagram publishers using wiremock

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syndic::config::SocialConfig;
use syndic::social::{InstagramPublisher, PublishError, Publisher, SocialPost, TelegramPublisher};

fn publisher(server: &MockServer) -> TelegramPublisher {
    let config = SocialConfig {
        enabled: true,
        telegram_token: Some("42:secret".to_string()),
        telegram_channel: Some("@newsroom".to_string()),
        telegram_api_base: server.uri(),
        site_url: "https://mirror.example/".to_string(),
        ..Default::default()
    };
    TelegramPublisher::from_config(&config, Duration::from_secs(5))
        .unwrap()
        .unwrap()
}

fn post(image_url: Option<&str>) -> SocialPost {
    SocialPost {
        post_id: 17,
        title: "Rates & <markets>".to_string(),
        text: "Central bank holds rates steady.".to_string(),
        image_url: image_url.map(str::to_string),
        tags: vec!["Central Banks".to_string(), "rates".to_string()],
    }
}

#[tokio::test]
async fn test_send_message_without_image() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot42:secret/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "@newsroom",
            "parse_mode": "HTML",
            "text": "<b>Rates &amp; &lt;markets&gt;</b>\n\nCentral bank holds rates steady.\n\nhttps://mirror.example/?p=17",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    publisher(&server).publish(&post(None)).await.unwrap();
}

#[tokio::test]
async fn test_send_photo_with_relative_image() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bot42:secret/sendPhoto"))
        .and(body_partial_json(json!({
            "chat_id": "@newsroom",
            "photo": "https://mirror.example/media/2024/01/cover.jpg",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
        .expect(1)
        .mount(&server)
        .await;

    publisher(&server)
        .publish(&post(Some("/media/2024/01/cover.jpg")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_api_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot is not a member of the channel chat",
        })))
        .mount(&server)
        .await;

    let err = publisher(&server).publish(&post(None)).await.unwrap_err();
    match err {
        PublishError::Api { status, description } => {
            assert_eq!(status, 403);
            assert!(description.contains("not a member"));
        }
        other => panic!("Expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ok_false_with_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": false })))
        .mount(&server)
        .await;

    assert!(publisher(&server).publish(&post(None)).await.is_err());
}

#[test]
fn test_disabled_config_builds_nothing() {
    let config = SocialConfig::default();
    assert!(TelegramPublisher::from_config(&config, Duration::from_secs(1))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_transport_error_hides_bot_token() {
    // nothing listens on the discard port
    let config = SocialConfig {
        enabled: true,
        telegram_token: Some("42:TOPSECRET".to_string()),
        telegram_channel: Some("@newsroom".to_string()),
        telegram_api_base: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    };
    let publisher = TelegramPublisher::from_config(&config, Duration::from_secs(2))
        .unwrap()
        .unwrap();

    let err = publisher.publish(&post(None)).await.unwrap_err();
    assert!(matches!(err, PublishError::Http(_)));
    assert!(err.is_recoverable());
    assert!(!err.to_string().contains("TOPSECRET"));
    assert!(!format!("{err:?}").contains("TOPSECRET"));
}

fn instagram(server: &MockServer) -> InstagramPublisher {
    let config = SocialConfig {
        enabled: true,
        instagram_token: Some("EAAB".to_string()),
        instagram_user_id: Some("1784".to_string()),
        instagram_api_base: server.uri(),
        site_url: "https://mirror.example".to_string(),
        ..Default::default()
    };
    InstagramPublisher::from_config(&config, Duration::from_secs(5))
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_instagram_creates_and_publishes_container() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .and(body_string_contains("image_url=https%3A%2F%2Fmirror.example%2Fmedia%2Fcover.jpg"))
        .and(body_string_contains("access_token=EAAB"))
        .and(body_string_contains("%23CentralBanks+%23rates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "container-9" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1784/media_publish"))
        .and(body_string_contains("creation_id=container-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "media-1" })))
        .expect(1)
        .mount(&server)
        .await;

    instagram(&server)
        .publish(&post(Some("/media/cover.jpg")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_instagram_skips_posts_without_image() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    instagram(&server).publish(&post(None)).await.unwrap();
}

#[tokio::test]
async fn test_instagram_graph_error_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/1784/media"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "Invalid OAuth access token.",
                "type": "OAuthException",
                "code": 190,
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/1784/media_publish"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "media-1" })))
        .expect(0)
        .mount(&server)
        .await;

    let err = instagram(&server)
        .publish(&post(Some("https://cdn.example/a.jpg")))
        .await
        .unwrap_err();
    match err {
        PublishError::Api { status, ref description } => {
            assert_eq!(status, 400);
            assert_eq!(description, "Invalid OAuth access token.");
        }
        ref other => panic!("Expected API error, got {other:?}"),
    }
    assert!(!err.is_recoverable());
}
