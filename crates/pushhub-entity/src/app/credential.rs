//! Provider credential rows and their decoded forms.

use chrono::{DateTime, Utc};
use pushhub_core::types::AppId;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::device::Platform;

/// Stored credentials for one (app, platform) pair.
///
/// `payload` holds the credential JSON, usually encrypted at rest.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformCredential {
    /// Owning app.
    pub app_id: AppId,
    /// Platform these credentials authenticate against.
    pub platform: Platform,
    /// Credential JSON, encrypted or plaintext.
    pub payload: String,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last rotated.
    pub updated_at: DateTime<Utc>,
}

/// VAPID key pair for WebPush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPushCredentials {
    /// `mailto:` or `https:` contact URI placed in the JWT `sub` claim.
    #[serde(default)]
    pub vapid_subject: Option<String>,
    /// Uncompressed P-256 public key, base64url.
    pub public_key: String,
    /// PKCS#8 DER private key (or raw 32-byte scalar), base64url.
    pub private_key: String,
}

/// Firebase Cloud Messaging service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FcmCredentials {
    /// Firebase project identifier.
    pub project_id: String,
    /// Google service-account key file contents.
    pub service_account_json: String,
}

/// APNs token-based authentication key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApnsCredentials {
    /// Key identifier from the developer portal.
    pub key_id: String,
    /// Apple developer team identifier.
    pub team_id: String,
    /// App bundle identifier, sent as `apns-topic`.
    pub bundle_id: String,
    /// `.p8` private key in PEM form.
    pub private_key: String,
    /// Use the production gateway instead of the sandbox.
    #[serde(default)]
    pub production: bool,
}

/// Decoded credentials for any platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCredentials {
    /// WebPush VAPID keys.
    WebPush(WebPushCredentials),
    /// FCM service account.
    Fcm(FcmCredentials),
    /// APNs signing key.
    Apns(ApnsCredentials),
}

impl ProviderCredentials {
    /// Parse credential JSON for the given platform.
    pub fn parse(platform: Platform, json: &str) -> Result<Self, serde_json::Error> {
        Ok(match platform {
            Platform::Web => Self::WebPush(serde_json::from_str(json)?),
            Platform::Android => Self::Fcm(serde_json::from_str(json)?),
            Platform::Ios => Self::Apns(serde_json::from_str(json)?),
        })
    }

    /// Platform these credentials belong to.
    pub fn platform(&self) -> Platform {
        match self {
            Self::WebPush(_) => Platform::Web,
            Self::Fcm(_) => Platform::Android,
            Self::Apns(_) => Platform::Ios,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_webpush_uses_camel_case() {
        let json = r#"{"vapidSubject":"mailto:ops@example.com","publicKey":"BPub","privateKey":"priv"}"#;
        let creds = ProviderCredentials::parse(Platform::Web, json).expect("parse");
        match creds {
            ProviderCredentials::WebPush(web) => {
                assert_eq!(web.vapid_subject.as_deref(), Some("mailto:ops@example.com"));
                assert_eq!(web.public_key, "BPub");
            }
            other => panic!("unexpected credentials: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let json = r#"{"projectId":"demo","serviceAccountJson":"{}"}"#;
        assert!(ProviderCredentials::parse(Platform::Ios, json).is_err());
        let fcm = ProviderCredentials::parse(Platform::Android, json).expect("parse");
        assert_eq!(fcm.platform(), Platform::Android);
    }
}
