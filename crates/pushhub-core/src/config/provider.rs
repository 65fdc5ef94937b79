//! Push provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by all push senders plus per-provider sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// HTTP request timeout for provider calls in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// WebPush settings.
    #[serde(default)]
    pub webpush: WebPushConfig,
    /// Firebase Cloud Messaging settings.
    #[serde(default)]
    pub fcm: FcmConfig,
    /// Apple Push Notification service settings.
    #[serde(default)]
    pub apns: ApnsConfig,
}

impl ProviderConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout(),
            webpush: WebPushConfig::default(),
            fcm: FcmConfig::default(),
            apns: ApnsConfig::default(),
        }
    }
}

/// WebPush message defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebPushConfig {
    /// Contact URI used when an app's credentials carry no subject.
    #[serde(default = "default_subject")]
    pub default_subject: String,
    /// `TTL` header value in seconds.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u32,
    /// `Urgency` header value.
    #[serde(default)]
    pub urgency: Urgency,
}

impl Default for WebPushConfig {
    fn default() -> Self {
        Self {
            default_subject: default_subject(),
            ttl_seconds: default_ttl(),
            urgency: Urgency::default(),
        }
    }
}

/// RFC 8030 message urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    /// Deliver only on power and wifi.
    VeryLow,
    /// Deliver on power or wifi.
    Low,
    /// Deliver when not in battery saver.
    #[default]
    Normal,
    /// Deliver immediately.
    High,
}

impl Urgency {
    /// Header value for this urgency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very-low",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

/// Firebase Cloud Messaging endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    /// Base URL of the FCM HTTP v1 API.
    #[serde(default = "default_fcm_base_url")]
    pub api_base_url: String,
    /// OAuth2 token endpoint override; the service account's `token_uri` is used otherwise.
    #[serde(default)]
    pub token_url: Option<String>,
}

impl Default for FcmConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_fcm_base_url(),
            token_url: None,
        }
    }
}

/// Apple Push Notification service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    /// Production gateway.
    #[serde(default = "default_apns_production_url")]
    pub production_url: String,
    /// Sandbox gateway.
    #[serde(default = "default_apns_sandbox_url")]
    pub sandbox_url: String,
}

impl Default for ApnsConfig {
    fn default() -> Self {
        Self {
            production_url: default_apns_production_url(),
            sandbox_url: default_apns_sandbox_url(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}

fn default_subject() -> String {
    "mailto:push@localhost".to_string()
}

fn default_ttl() -> u32 {
    86400
}

fn default_fcm_base_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

fn default_apns_production_url() -> String {
    "https://api.push.apple.com".to_string()
}

fn default_apns_sandbox_url() -> String {
    "https://api.sandbox.push.apple.com".to_string()
}
