//! Cache key builders.
//!
//! Keys carry no global prefix; the Redis backend prepends
//! `cache.redis.key_prefix`.

use pushhub_core::types::AppId;
use pushhub_entity::device::Platform;

/// Stored (encrypted) credential payload of an app for one platform.
pub fn credentials(app_id: AppId, platform: Platform) -> String {
    format!("credentials:{app_id}:{}", platform.as_str())
}

/// Pattern matching every credential entry of an app.
pub fn credentials_pattern(app_id: AppId) -> String {
    format!("credentials:{app_id}:*")
}

/// OAuth access token minted from an FCM service account.
pub fn fcm_access_token(project_id: &str, client_email: &str) -> String {
    format!("token:fcm:{project_id}:{client_email}")
}

/// APNs provider token for a signing key.
pub fn apns_provider_token(team_id: &str, key_id: &str) -> String {
    format!("token:apns:{team_id}:{key_id}")
}
