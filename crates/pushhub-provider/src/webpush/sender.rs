//! WebPush HTTP sender.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use serde::Serialize;
use tracing::debug;

use pushhub_core::types::NotificationId;
use pushhub_entity::device::Platform;
use pushhub_entity::notification::NotificationPayload;

use super::codec::WebPushCodec;
use crate::error::ProviderError;
use crate::message::{PushMessage, SendResult};
use crate::sender::{PushSender, http_error_text};

/// JSON document encrypted into each WebPush message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebPushPayload<'a> {
    #[serde(flatten)]
    content: &'a NotificationPayload,
    notification_id: NotificationId,
}

/// Sends encrypted messages to browser push services.
#[derive(Debug, Clone)]
pub struct WebPushSender {
    client: reqwest::Client,
    codec: WebPushCodec,
}

impl WebPushSender {
    /// Create a sender using a shared HTTP client.
    pub fn new(client: reqwest::Client, codec: WebPushCodec) -> Self {
        Self { client, codec }
    }

    /// VAPID public key this sender signs with.
    pub fn public_key(&self) -> &str {
        self.codec.signer().public_key()
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    fn platform(&self) -> Platform {
        Platform::Web
    }

    async fn send(&self, message: &PushMessage) -> Result<SendResult, ProviderError> {
        let (Some(p256dh), Some(auth)) = (&message.p256dh, &message.auth) else {
            return Err(ProviderError::Validation(
                "WebPush subscription is missing p256dh or auth".to_string(),
            ));
        };

        let document = WebPushPayload {
            content: &message.payload,
            notification_id: message.notification_id,
        };
        let json = serde_json::to_vec(&document)
            .map_err(|e| ProviderError::Internal(format!("Failed to serialize payload: {e}")))?;

        let request = self.codec.encode(&message.token, &json, p256dh, auth)?;

        let mut builder = self.client.post(&request.endpoint);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        let response = builder.body(request.body).send().await?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            debug!(
                device_id = %message.device_id,
                status = status.as_u16(),
                "WebPush message accepted"
            );
            return Ok(SendResult::success(message_id, status.as_u16()));
        }

        let detail = response.text().await.unwrap_or_default();
        Ok(SendResult::failure(
            http_error_text(status.as_u16(), &detail),
            status.as_u16(),
        ))
    }
}
