//! Firebase Cloud Messaging HTTP v1 sender.
//!
//! Authenticates with an OAuth2 access token minted from the app's service
//! account (RS256 JWT bearer assertion). Tokens are cached until shortly
//! before they expire.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use pushhub_cache::{CacheManager, keys};
use pushhub_core::config::FcmConfig;
use pushhub_core::traits::CacheProvider;
use pushhub_entity::app::FcmCredentials;
use pushhub_entity::device::Platform;

use crate::error::ProviderError;
use crate::message::{PushMessage, SendResult};
use crate::sender::{PushSender, http_error_text};

const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

/// Fields used from a Google service-account key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Sends messages through the FCM HTTP v1 API.
#[derive(Clone)]
pub struct FcmSender {
    client: reqwest::Client,
    project_id: String,
    client_email: String,
    signing_key: EncodingKey,
    send_url: String,
    token_url: String,
    cache: CacheManager,
}

impl std::fmt::Debug for FcmSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmSender")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("send_url", &self.send_url)
            .finish_non_exhaustive()
    }
}

impl FcmSender {
    /// Build a sender from an app's FCM credentials.
    pub fn new(
        client: reqwest::Client,
        credentials: &FcmCredentials,
        config: &FcmConfig,
        cache: CacheManager,
    ) -> Result<Self, ProviderError> {
        let account: ServiceAccount = serde_json::from_str(&credentials.service_account_json)
            .map_err(|e| ProviderError::Configuration(format!("Invalid FCM service account: {e}")))?;
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|e| {
            ProviderError::Configuration(format!("Invalid FCM service account private key: {e}"))
        })?;

        Ok(Self {
            client,
            send_url: format!(
                "{}/v1/projects/{}/messages:send",
                config.api_base_url.trim_end_matches('/'),
                credentials.project_id
            ),
            token_url: config.token_url.clone().unwrap_or(account.token_uri),
            project_id: credentials.project_id.clone(),
            client_email: account.client_email,
            signing_key,
            cache,
        })
    }

    fn token_key(&self) -> String {
        keys::fcm_access_token(&self.project_id, &self.client_email)
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let key = self.token_key();
        match self.cache.get(&key).await {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "FCM token cache read failed"),
        }

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: MESSAGING_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|e| ProviderError::Configuration(format!("Failed to sign FCM assertion: {e}")))?;

        let response = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("grant_type={JWT_BEARER_GRANT}&assertion={assertion}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let text = format!("FCM token exchange failed: {}", http_error_text(status.as_u16(), &detail));
            return Err(if status.is_server_error() {
                ProviderError::Network(text)
            } else {
                ProviderError::Configuration(text)
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(format!("Invalid FCM token response: {e}")))?;

        let ttl = token.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS).max(1);
        if let Err(e) = self
            .cache
            .set(&key, &token.access_token, Duration::from_secs(ttl))
            .await
        {
            warn!(error = %e, "FCM token cache write failed");
        }
        debug!(project_id = %self.project_id, ttl, "Minted FCM access token");
        Ok(token.access_token)
    }

    fn message_body(message: &PushMessage) -> Value {
        let payload = &message.payload;

        // FCM data values must be strings.
        let mut data = BTreeMap::new();
        if let Some(Value::Object(fields)) = &payload.data {
            for (key, value) in fields {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                data.insert(key.clone(), value);
            }
        }
        data.insert("notificationId".to_string(), message.notification_id.to_string());
        if let Some(click_action) = &payload.click_action {
            data.insert("clickAction".to_string(), click_action.clone());
        }

        let mut notification = json!({ "title": payload.title, "body": payload.body });
        if let Some(image) = &payload.image_url {
            notification["image"] = json!(image);
        }

        let mut android = json!({});
        if let Some(icon) = &payload.icon {
            android["icon"] = json!(icon);
        }
        if let Some(sound) = &payload.sound {
            android["sound"] = json!(sound);
        }
        if let Some(click_action) = &payload.click_action {
            android["click_action"] = json!(click_action);
        }

        json!({
            "message": {
                "token": message.token,
                "notification": notification,
                "data": data,
                "android": { "notification": android },
            }
        })
    }

    /// Flatten an FCM error document into `STATUS: message (errorCode)`.
    fn error_detail(body: &str) -> String {
        let Ok(doc) = serde_json::from_str::<Value>(body) else {
            return body.to_string();
        };
        let error = &doc["error"];
        let status = error["status"].as_str().unwrap_or_default();
        let text = error["message"].as_str().unwrap_or_default();
        let code = error["details"]
            .as_array()
            .and_then(|details| details.iter().find_map(|d| d["errorCode"].as_str()));

        match code {
            Some(code) => format!("{status}: {text} ({code})"),
            None => format!("{status}: {text}"),
        }
    }
}

#[async_trait]
impl PushSender for FcmSender {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn send(&self, message: &PushMessage) -> Result<SendResult, ProviderError> {
        if message.token.trim().is_empty() {
            return Err(ProviderError::Validation("FCM registration token is empty".to_string()));
        }

        let token = self.access_token().await?;
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(token)
            .json(&Self::message_body(message))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            let message_id = body["name"].as_str().map(str::to_string);
            return Ok(SendResult::success(message_id, status.as_u16()));
        }

        if status.as_u16() == 401 {
            // Force a fresh access token on the next attempt.
            if let Err(e) = self.cache.delete(&self.token_key()).await {
                warn!(error = %e, "Failed to drop rejected FCM token");
            }
        }

        let body = response.text().await.unwrap_or_default();
        Ok(SendResult::failure(
            http_error_text(status.as_u16(), &Self::error_detail(&body)),
            status.as_u16(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushhub_core::types::{DeviceId, NotificationId};
    use pushhub_entity::notification::NotificationPayload;

    #[test]
    fn test_error_detail_includes_error_code() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND","details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert_eq!(
            FcmSender::error_detail(body),
            "NOT_FOUND: Requested entity was not found. (UNREGISTERED)"
        );
        assert_eq!(FcmSender::error_detail("plain text"), "plain text");
    }

    #[test]
    fn test_message_body_stringifies_data() {
        let mut payload = NotificationPayload::new("Sale", "50% off");
        payload.data = Some(json!({"orderId": 42, "tag": "promo"}));
        payload.click_action = Some("https://shop.example.com/sale".to_string());
        let message = PushMessage {
            notification_id: NotificationId::new(),
            device_id: DeviceId::new(),
            token: "fcm-token".to_string(),
            p256dh: None,
            auth: None,
            payload,
        };

        let body = FcmSender::message_body(&message);
        assert_eq!(body["message"]["token"], "fcm-token");
        assert_eq!(body["message"]["data"]["orderId"], "42");
        assert_eq!(body["message"]["data"]["tag"], "promo");
        assert_eq!(
            body["message"]["android"]["notification"]["click_action"],
            "https://shop.example.com/sale"
        );
        assert_eq!(
            body["message"]["data"]["notificationId"],
            message.notification_id.to_string()
        );
    }
}
