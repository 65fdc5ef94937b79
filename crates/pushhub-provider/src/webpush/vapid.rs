//! VAPID application-server authentication (RFC 8292).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::SecretKey;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use super::decode_base64url;
use crate::error::ProviderError;

/// Lifetime of a signed VAPID token.
pub const TOKEN_TTL_HOURS: i64 = 12;

/// JWT claims carried in the `Authorization: vapid` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VapidClaims {
    /// Origin of the push service.
    pub aud: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Contact URI of the application server.
    pub sub: String,
}

/// Header values authenticating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VapidHeaders {
    /// `Authorization` header value.
    pub authorization: String,
    /// `Crypto-Key` header value.
    pub crypto_key: String,
}

/// A freshly generated VAPID key pair, both halves base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyPair {
    /// Uncompressed P-256 public key (65 bytes).
    pub public_key: String,
    /// PKCS#8 DER private key.
    pub private_key: String,
}

impl VapidKeyPair {
    /// Generate a new key pair.
    pub fn generate() -> Result<Self, ProviderError> {
        let secret = SecretKey::random(&mut OsRng);
        let der = secret
            .to_pkcs8_der()
            .map_err(|e| ProviderError::Encryption(format!("Failed to encode private key: {e}")))?;
        Ok(Self {
            public_key: public_key_base64url(&secret),
            private_key: BASE64URL.encode(der.as_bytes()),
        })
    }
}

fn public_key_base64url(secret: &SecretKey) -> String {
    BASE64URL.encode(secret.public_key().to_encoded_point(false).as_bytes())
}

/// Decode a stored private key: PKCS#8 DER, or a raw 32-byte scalar.
fn decode_private_key(private_key: &str) -> Result<SecretKey, ProviderError> {
    let bytes = decode_base64url(private_key)
        .map_err(|_| ProviderError::Configuration("VAPID private key is not base64url".to_string()))?;

    let secret = if bytes.len() == 32 {
        SecretKey::from_slice(&bytes).map_err(|_| {
            ProviderError::Configuration("VAPID private key is not a valid P-256 scalar".to_string())
        })?
    } else {
        SecretKey::from_pkcs8_der(&bytes).map_err(|e| {
            ProviderError::Configuration(format!("VAPID private key is not PKCS#8 DER: {e}"))
        })?
    };
    Ok(secret)
}

/// `scheme://host[:port]` of a push endpoint.
pub fn audience(endpoint: &str) -> Result<String, ProviderError> {
    let url = Url::parse(endpoint)
        .map_err(|e| ProviderError::Validation(format!("Invalid push endpoint '{endpoint}': {e}")))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ProviderError::Validation(format!(
            "Push endpoint must be an http(s) URL, got scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ProviderError::Validation(format!(
            "Push endpoint '{endpoint}' has no host"
        )));
    }
    Ok(url.origin().ascii_serialization())
}

/// Signs VAPID tokens for one application-server key pair.
///
/// Construction fails with [`ProviderError::Encryption`] when the private
/// key does not derive the configured public key.
#[derive(Clone)]
pub struct VapidSigner {
    encoding_key: EncodingKey,
    public_key: String,
    subject: String,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// Build a signer from the stored key pair and contact subject.
    pub fn new(public_key: &str, private_key: &str, subject: &str) -> Result<Self, ProviderError> {
        if !(subject.starts_with("mailto:") || subject.starts_with("https:")) {
            return Err(ProviderError::Configuration(format!(
                "VAPID subject must be a mailto: or https: URI, got '{subject}'"
            )));
        }

        let secret = checked_secret(public_key, private_key)?;

        let der = secret
            .to_pkcs8_der()
            .map_err(|e| ProviderError::Encryption(format!("Failed to encode private key: {e}")))?;

        Ok(Self {
            encoding_key: EncodingKey::from_ec_der(der.as_bytes()),
            public_key: public_key_base64url(&secret),
            subject: subject.to_string(),
        })
    }

    /// Public key (base64url) subscribers registered against.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Contact subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Sign a token for `endpoint` and format the request headers.
    pub fn headers(&self, endpoint: &str) -> Result<VapidHeaders, ProviderError> {
        let claims = VapidClaims {
            aud: audience(endpoint)?,
            exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
            sub: self.subject.clone(),
        };
        let token = encode(&Header::new(Algorithm::ES256), &claims, &self.encoding_key)
            .map_err(|e| ProviderError::Encryption(format!("Failed to sign VAPID token: {e}")))?;

        Ok(VapidHeaders {
            authorization: format!("vapid t={token}, k={}", self.public_key),
            crypto_key: format!("p256ecdsa={}", self.public_key),
        })
    }
}

/// Check that a stored key pair is consistent.
pub fn verify_key_pair(public_key: &str, private_key: &str) -> Result<(), ProviderError> {
    checked_secret(public_key, private_key).map(|_| ())
}

/// Decode the private key and require that it derives `public_key`.
fn checked_secret(public_key: &str, private_key: &str) -> Result<SecretKey, ProviderError> {
    let secret = decode_private_key(private_key)?;
    let configured = decode_base64url(public_key)
        .map_err(|_| ProviderError::Configuration("VAPID public key is not base64url".to_string()))?;
    if secret.public_key().to_encoded_point(false).as_bytes() != configured.as_slice() {
        return Err(ProviderError::Encryption(
            "VAPID private key does not match the configured public key".to_string(),
        ));
    }
    Ok(secret)
}
