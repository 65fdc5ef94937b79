//! At-rest credential decryption configuration.

use serde::{Deserialize, Serialize};

/// How stored provider credentials are decrypted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Base64-encoded 32-byte AES-256-GCM key. Credentials are read as
    /// plaintext JSON when unset.
    #[serde(default)]
    pub encryption_key: Option<String>,
    /// Use the stored value as-is when decryption fails instead of
    /// rejecting the credentials.
    #[serde(default)]
    pub allow_plaintext_fallback: bool,
}
