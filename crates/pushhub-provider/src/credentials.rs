//! At-rest protection of stored provider credentials.
//!
//! Encrypted payloads are `base64(nonce || ciphertext)` under AES-256-GCM
//! with a 12-byte random nonce.

use std::fmt;
use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use pushhub_core::config::CredentialConfig;

use crate::error::ProviderError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Turns stored credential payloads into credential JSON and back.
pub trait CredentialCipher: Send + Sync + fmt::Debug {
    /// Decrypt a stored payload.
    fn decrypt(&self, payload: &str) -> Result<String, ProviderError>;

    /// Encrypt credential JSON for storage.
    fn encrypt(&self, plaintext: &str) -> Result<String, ProviderError>;
}

/// Payloads are stored as plaintext JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCipher;

impl CredentialCipher for PlaintextCipher {
    fn decrypt(&self, payload: &str) -> Result<String, ProviderError> {
        Ok(payload.to_string())
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, ProviderError> {
        Ok(plaintext.to_string())
    }
}

/// AES-256-GCM credential cipher.
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesGcmCipher")
    }
}

impl AesGcmCipher {
    /// Create a cipher from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, ProviderError> {
        if key.len() != KEY_SIZE {
            return Err(ProviderError::Configuration(format!(
                "Credential encryption key must be {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| ProviderError::Configuration(format!("Invalid encryption key: {e}")))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded key.
    pub fn from_base64(key: &str) -> Result<Self, ProviderError> {
        let key = BASE64.decode(key.trim()).map_err(|e| {
            ProviderError::Configuration(format!("Credential encryption key is not base64: {e}"))
        })?;
        Self::new(&key)
    }
}

impl CredentialCipher for AesGcmCipher {
    fn decrypt(&self, payload: &str) -> Result<String, ProviderError> {
        let raw = BASE64
            .decode(payload.trim())
            .map_err(|e| ProviderError::Encryption(format!("Credential payload is not base64: {e}")))?;
        if raw.len() <= NONCE_SIZE {
            return Err(ProviderError::Encryption(
                "Credential payload is too short".to_string(),
            ));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProviderError::Encryption("Credential decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| ProviderError::Encryption(format!("Credential payload is not UTF-8: {e}")))
    }

    fn encrypt(&self, plaintext: &str) -> Result<String, ProviderError> {
        let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| ProviderError::Encryption("Credential encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }
}

/// Cipher selected by `credentials.encryption_key`.
pub fn cipher_from_config(
    config: &CredentialConfig,
) -> Result<Arc<dyn CredentialCipher>, ProviderError> {
    match config.encryption_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(Arc::new(AesGcmCipher::from_base64(key)?)),
        _ => Ok(Arc::new(PlaintextCipher)),
    }
}
