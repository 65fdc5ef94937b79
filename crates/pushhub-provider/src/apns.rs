//! Apple Push Notification service sender (token-based auth).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use pushhub_cache::{CacheManager, keys};
use pushhub_core::config::ApnsConfig;
use pushhub_core::traits::CacheProvider;
use pushhub_entity::app::ApnsCredentials;
use pushhub_entity::device::Platform;

use crate::error::ProviderError;
use crate::message::{PushMessage, SendResult};
use crate::sender::{PushSender, http_error_text};

/// Apple accepts a provider token for up to an hour.
const PROVIDER_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

#[derive(Debug, Serialize)]
struct ProviderClaims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: String,
}

/// Sends alerts to APNs over HTTP/2.
#[derive(Clone)]
pub struct ApnsSender {
    client: reqwest::Client,
    signing_key: EncodingKey,
    key_id: String,
    team_id: String,
    bundle_id: String,
    base_url: String,
    cache: CacheManager,
}

impl std::fmt::Debug for ApnsSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApnsSender")
            .field("key_id", &self.key_id)
            .field("team_id", &self.team_id)
            .field("bundle_id", &self.bundle_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApnsSender {
    /// Build a sender from an app's APNs signing key.
    pub fn new(
        client: reqwest::Client,
        credentials: &ApnsCredentials,
        config: &ApnsConfig,
        cache: CacheManager,
    ) -> Result<Self, ProviderError> {
        let signing_key = EncodingKey::from_ec_pem(credentials.private_key.as_bytes())
            .map_err(|e| ProviderError::Configuration(format!("Invalid APNs signing key: {e}")))?;
        let base_url = if credentials.production {
            &config.production_url
        } else {
            &config.sandbox_url
        };

        Ok(Self {
            client,
            signing_key,
            key_id: credentials.key_id.clone(),
            team_id: credentials.team_id.clone(),
            bundle_id: credentials.bundle_id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    fn token_key(&self) -> String {
        keys::apns_provider_token(&self.team_id, &self.key_id)
    }

    async fn provider_token(&self) -> Result<String, ProviderError> {
        let key = self.token_key();
        match self.cache.get(&key).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "APNs token cache read failed"),
        }

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        let claims = ProviderClaims {
            iss: &self.team_id,
            iat: Utc::now().timestamp(),
        };
        let token = encode(&header, &claims, &self.signing_key)
            .map_err(|e| ProviderError::Configuration(format!("Failed to sign APNs token: {e}")))?;

        if let Err(e) = self.cache.set(&key, &token, PROVIDER_TOKEN_TTL).await {
            warn!(error = %e, "APNs token cache write failed");
        }
        debug!(team_id = %self.team_id, key_id = %self.key_id, "Signed APNs provider token");
        Ok(token)
    }

    fn message_body(message: &PushMessage) -> Value {
        let payload = &message.payload;

        let mut aps = json!({
            "alert": { "title": payload.title, "body": payload.body },
        });
        if let Some(badge) = payload.badge {
            aps["badge"] = json!(badge);
        }
        if let Some(sound) = &payload.sound {
            aps["sound"] = json!(sound);
        }
        if payload.image_url.is_some() {
            aps["mutable-content"] = json!(1);
        }

        let mut body = json!({
            "aps": aps,
            "notificationId": message.notification_id,
        });
        if let Some(data) = &payload.data {
            body["data"] = data.clone();
        }
        if let Some(click_action) = &payload.click_action {
            body["clickAction"] = json!(click_action);
        }
        if let Some(image) = &payload.image_url {
            body["imageUrl"] = json!(image);
        }
        body
    }
}

#[async_trait]
impl PushSender for ApnsSender {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    async fn send(&self, message: &PushMessage) -> Result<SendResult, ProviderError> {
        let device_token = message.token.trim();
        if device_token.is_empty() || !device_token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProviderError::Validation(
                "APNs device token must be a hex string".to_string(),
            ));
        }

        let token = self.provider_token().await?;
        let response = self
            .client
            .post(format!("{}/3/device/{device_token}", self.base_url))
            .header("authorization", format!("bearer {token}"))
            .header("apns-topic", &self.bundle_id)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(&Self::message_body(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let apns_id = response
                .headers()
                .get("apns-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Ok(SendResult::success(apns_id, status.as_u16()));
        }

        let text = response.text().await.unwrap_or_default();
        let reason = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.reason)
            .unwrap_or(text);

        if matches!(reason.as_str(), "ExpiredProviderToken" | "InvalidProviderToken") {
            if let Err(e) = self.cache.delete(&self.token_key()).await {
                warn!(error = %e, "Failed to drop rejected APNs token");
            }
        }

        Ok(SendResult::failure(
            http_error_text(status.as_u16(), &reason),
            status.as_u16(),
        ))
    }
}
