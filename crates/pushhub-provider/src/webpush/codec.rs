//! Builds the complete WebPush HTTP request for one message.

use bytes::Bytes;

use pushhub_core::config::{Urgency, WebPushConfig};

use super::decode_base64url;
use super::ece;
use super::vapid::VapidSigner;
use crate::error::ProviderError;

/// Body and headers ready to POST to a push endpoint.
#[derive(Debug, Clone)]
pub struct WebPushRequest {
    /// Push endpoint URL.
    pub endpoint: String,
    /// Request headers in send order.
    pub headers: Vec<(&'static str, String)>,
    /// Encrypted `aes128gcm` record.
    pub body: Bytes,
}

impl WebPushRequest {
    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Pure WebPush message encoder: no I/O, no shared state.
#[derive(Debug, Clone)]
pub struct WebPushCodec {
    signer: VapidSigner,
    ttl_seconds: u32,
    urgency: Urgency,
}

impl WebPushCodec {
    /// Create a codec for one application-server key pair.
    pub fn new(signer: VapidSigner, config: &WebPushConfig) -> Self {
        Self {
            signer,
            ttl_seconds: config.ttl_seconds,
            urgency: config.urgency,
        }
    }

    /// The VAPID signer.
    pub fn signer(&self) -> &VapidSigner {
        &self.signer
    }

    /// Encrypt `payload` for the subscription and attach VAPID headers.
    pub fn encode(
        &self,
        endpoint: &str,
        payload: &[u8],
        p256dh: &str,
        auth: &str,
    ) -> Result<WebPushRequest, ProviderError> {
        let p256dh = decode_base64url(p256dh).map_err(|e| {
            ProviderError::Validation(format!("Subscriber p256dh is not base64url: {e}"))
        })?;
        let auth = decode_base64url(auth)
            .map_err(|e| ProviderError::Validation(format!("Subscriber auth is not base64url: {e}")))?;

        let vapid = self.signer.headers(endpoint)?;
        let body = ece::encrypt(payload, &p256dh, &auth)?;

        let headers = vec![
            ("Content-Type", "application/octet-stream".to_string()),
            ("Content-Encoding", "aes128gcm".to_string()),
            ("Content-Length", body.len().to_string()),
            ("TTL", self.ttl_seconds.to_string()),
            ("Urgency", self.urgency.as_str().to_string()),
            ("Authorization", vapid.authorization),
            ("Crypto-Key", vapid.crypto_key),
        ];

        Ok(WebPushRequest {
            endpoint: endpoint.to_string(),
            headers,
            body: Bytes::from(body),
        })
    }
}
