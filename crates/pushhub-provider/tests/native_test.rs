//! FCM and APNs senders against mock provider endpoints.

mod common;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pushhub_core::config::ProviderConfig;
use pushhub_core::types::{AppId, DeviceId, NotificationId};
use pushhub_entity::device::Platform;
use pushhub_entity::notification::NotificationPayload;
use pushhub_provider::{ProviderError, PushMessage, SenderResolver};

use common::{apns_credentials, fcm_credentials, registry, store_credentials};

fn native_message(token: &str) -> PushMessage {
    PushMessage {
        notification_id: NotificationId::new(),
        device_id: DeviceId::new(),
        token: token.to_string(),
        p256dh: None,
        auth: None,
        payload: NotificationPayload::new("Order shipped", "Arrives Tuesday"),
    }
}

fn config_for(server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::default();
    config.fcm.api_base_url = server.uri();
    config.apns.sandbox_url = server.uri();
    config
}

#[tokio::test]
async fn test_fcm_access_token_is_cached_between_sends() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "ya29.test", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/demo-project/messages:send"))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "projects/demo-project/messages/0:1"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let (store, registry) = registry(config_for(&server));
    let app_id = AppId::new();
    let token_uri = format!("{}/token", server.uri());
    store_credentials(&store, app_id, Platform::Android, &fcm_credentials(&token_uri)).await;

    let sender = registry.resolve(app_id, Platform::Android).await.unwrap();
    for _ in 0..2 {
        let result = sender.send(&native_message("fcm-registration-token")).await.unwrap();
        assert!(result.success);
        assert_eq!(
            result.message_id.as_deref(),
            Some("projects/demo-project/messages/0:1")
        );
    }
}

#[tokio::test]
async fn test_fcm_unregistered_token_surfaces_error_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "ya29.test", "expires_in": 3600})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/demo-project/messages:send"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Requested entity was not found.",
                "status": "NOT_FOUND",
                "details": [{"errorCode": "UNREGISTERED"}]
            }
        })))
        .mount(&server)
        .await;

    let (store, registry) = registry(config_for(&server));
    let app_id = AppId::new();
    let token_uri = format!("{}/token", server.uri());
    store_credentials(&store, app_id, Platform::Android, &fcm_credentials(&token_uri)).await;

    let sender = registry.resolve(app_id, Platform::Android).await.unwrap();
    let result = sender.send(&native_message("stale-token")).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status_code, Some(404));
    assert!(result.error.unwrap().contains("UNREGISTERED"));
}

#[tokio::test]
async fn test_fcm_rejected_service_account_is_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let (store, registry) = registry(config_for(&server));
    let app_id = AppId::new();
    let token_uri = format!("{}/token", server.uri());
    store_credentials(&store, app_id, Platform::Android, &fcm_credentials(&token_uri)).await;

    let sender = registry.resolve(app_id, Platform::Android).await.unwrap();
    let err = sender.send(&native_message("token")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Configuration(_)));
}

#[tokio::test]
async fn test_apns_send_uses_topic_and_returns_apns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/3/device/a1b2c3d4"))
        .and(header("apns-topic", "com.example.shop"))
        .and(header("apns-push-type", "alert"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("apns-id", "EC1BF194-B3B2-424A-89A9-5A918A6E6B5C"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (store, registry) = registry(config_for(&server));
    let app_id = AppId::new();
    store_credentials(&store, app_id, Platform::Ios, &apns_credentials()).await;

    let sender = registry.resolve(app_id, Platform::Ios).await.unwrap();
    let result = sender.send(&native_message("a1b2c3d4")).await.unwrap();
    assert!(result.success);
    assert_eq!(
        result.message_id.as_deref(),
        Some("EC1BF194-B3B2-424A-89A9-5A918A6E6B5C")
    );

    let requests = server.received_requests().await.unwrap();
    let authorization = requests[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert!(authorization.starts_with("bearer "));
}

#[tokio::test]
async fn test_apns_reason_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({"reason": "Unregistered"})))
        .mount(&server)
        .await;

    let (store, registry) = registry(config_for(&server));
    let app_id = AppId::new();
    store_credentials(&store, app_id, Platform::Ios, &apns_credentials()).await;

    let sender = registry.resolve(app_id, Platform::Ios).await.unwrap();
    let result = sender.send(&native_message("a1b2c3d4")).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("HTTP 410: Unregistered"));
}

#[tokio::test]
async fn test_apns_rejects_non_hex_token() {
    let (store, registry) = registry(ProviderConfig::default());
    let app_id = AppId::new();
    store_credentials(&store, app_id, Platform::Ios, &apns_credentials()).await;

    let sender = registry.resolve(app_id, Platform::Ios).await.unwrap();
    let err = sender.send(&native_message("not a token")).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation(_)));
}
