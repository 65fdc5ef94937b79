//! Shared helpers for provider integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use p256::SecretKey;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;

use pushhub_cache::CacheManager;
use pushhub_core::config::ProviderConfig;
use pushhub_core::types::{AppId, DeviceId, NotificationId};
use pushhub_database::MemoryStore;
use pushhub_database::store::CredentialStore;
use pushhub_entity::device::Platform;
use pushhub_entity::notification::NotificationPayload;
use pushhub_provider::webpush::VapidKeyPair;
use pushhub_provider::{CredentialCipher, PlaintextCipher, ProviderRegistry, PushMessage};

/// Browser-side half of a push subscription.
pub struct Subscriber {
    pub secret: SecretKey,
    pub auth: [u8; 16],
}

impl Subscriber {
    pub fn new() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
            auth: [0x5a; 16],
        }
    }

    pub fn p256dh(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.secret.public_key().to_encoded_point(false).as_bytes())
    }

    pub fn auth(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.auth)
    }

    pub fn message(&self, endpoint: String) -> PushMessage {
        PushMessage {
            notification_id: NotificationId::new(),
            device_id: DeviceId::new(),
            token: endpoint,
            p256dh: Some(self.p256dh()),
            auth: Some(self.auth()),
            payload: NotificationPayload::new("Flash sale", "Everything 20% off"),
        }
    }
}

pub fn webpush_credentials(keys: &VapidKeyPair) -> String {
    serde_json::json!({
        "vapidSubject": "mailto:ops@example.com",
        "publicKey": keys.public_key,
        "privateKey": keys.private_key,
    })
    .to_string()
}

pub fn fcm_credentials(token_uri: &str) -> String {
    let service_account = serde_json::json!({
        "type": "service_account",
        "client_email": "pushhub@demo-project.iam.gserviceaccount.com",
        "private_key": include_str!("../fixtures/service_account_key.pem"),
        "token_uri": token_uri,
    });
    serde_json::json!({
        "projectId": "demo-project",
        "serviceAccountJson": service_account.to_string(),
    })
    .to_string()
}

pub fn apns_credentials() -> String {
    serde_json::json!({
        "keyId": "ABC123DEFG",
        "teamId": "TEAM123456",
        "bundleId": "com.example.shop",
        "privateKey": include_str!("../fixtures/apns_auth_key.p8"),
    })
    .to_string()
}

/// Registry over a fresh in-memory store with plaintext credentials.
pub fn registry(config: ProviderConfig) -> (Arc<MemoryStore>, ProviderRegistry) {
    registry_with(config, Arc::new(PlaintextCipher), false)
}

pub fn registry_with(
    config: ProviderConfig,
    cipher: Arc<dyn CredentialCipher>,
    allow_plaintext_fallback: bool,
) -> (Arc<MemoryStore>, ProviderRegistry) {
    let store = Arc::new(MemoryStore::new());
    let registry = ProviderRegistry::with_cipher(
        store.clone(),
        CacheManager::in_memory(),
        config,
        cipher,
        allow_plaintext_fallback,
    )
    .expect("registry");
    (store, registry)
}

pub async fn store_credentials(
    store: &MemoryStore,
    app_id: AppId,
    platform: Platform,
    payload: &str,
) {
    store
        .upsert(app_id, platform, payload)
        .await
        .expect("store credentials");
}
