//! RFC 8291 message encryption using the RFC 8188 `aes128gcm` content
//! coding, as a single record.
//!
//! Record layout:
//! `salt(16) || rs(4, BE) || idlen(1) || keyid(65) || ciphertext || tag(16)`
//! where `keyid` is the sender's ephemeral public key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

use crate::error::ProviderError;

/// Record size advertised in the header.
pub const RECORD_SIZE: u32 = 4096;

/// Largest plaintext that fits in one record.
pub const MAX_PLAINTEXT_LEN: usize = RECORD_SIZE as usize - TAG_LEN - 1;

/// Length of an uncompressed P-256 point.
pub const PUBLIC_KEY_LEN: usize = 65;

/// Length of the subscriber auth secret.
pub const AUTH_SECRET_LEN: usize = 16;

const SALT_LEN: usize = 16;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN;
const PADDING_DELIMITER: u8 = 0x02;

const KEY_INFO_PREFIX: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

fn crypto_err(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Encryption(e.to_string())
}

/// Parse and check a subscriber public key.
pub fn subscriber_key(p256dh: &[u8]) -> Result<PublicKey, ProviderError> {
    if p256dh.len() != PUBLIC_KEY_LEN || p256dh[0] != 0x04 {
        return Err(ProviderError::Validation(format!(
            "Subscriber public key must be a {PUBLIC_KEY_LEN}-byte uncompressed P-256 point, got {} bytes",
            p256dh.len()
        )));
    }
    PublicKey::from_sec1_bytes(p256dh).map_err(|_| {
        ProviderError::Validation("Subscriber public key is not a point on P-256".to_string())
    })
}

fn check_auth(auth: &[u8]) -> Result<(), ProviderError> {
    if auth.len() != AUTH_SECRET_LEN {
        return Err(ProviderError::Validation(format!(
            "Subscriber auth secret must be {AUTH_SECRET_LEN} bytes, got {}",
            auth.len()
        )));
    }
    Ok(())
}

/// Derive the content-encryption key and nonce for one record.
fn derive_keys(
    shared_secret: &[u8],
    auth: &[u8],
    ua_public: &[u8],
    as_public: &[u8],
    salt: &[u8],
) -> Result<([u8; 16], [u8; 12]), ProviderError> {
    let mut info = Vec::with_capacity(KEY_INFO_PREFIX.len() + 2 * PUBLIC_KEY_LEN);
    info.extend_from_slice(KEY_INFO_PREFIX);
    info.extend_from_slice(ua_public);
    info.extend_from_slice(as_public);

    let mut ikm = [0u8; 32];
    Hkdf::<Sha256>::new(Some(auth), shared_secret)
        .expand(&info, &mut ikm)
        .map_err(crypto_err)?;

    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(salt).map_err(crypto_err)?;
    mac.update(&ikm);
    let prk = mac.finalize().into_bytes();

    let hkdf = Hkdf::<Sha256>::from_prk(&prk).map_err(crypto_err)?;
    let mut cek = [0u8; 16];
    hkdf.expand(CEK_INFO, &mut cek).map_err(crypto_err)?;
    let mut nonce = [0u8; 12];
    hkdf.expand(NONCE_INFO, &mut nonce).map_err(crypto_err)?;

    Ok((cek, nonce))
}

/// Encrypt `plaintext` for the subscriber identified by `p256dh` / `auth`
/// (both raw bytes). A fresh ephemeral key and salt are used per call.
pub fn encrypt(plaintext: &[u8], p256dh: &[u8], auth: &[u8]) -> Result<Vec<u8>, ProviderError> {
    let ua_public = subscriber_key(p256dh)?;
    check_auth(auth)?;
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(ProviderError::Validation(format!(
            "Payload is {} bytes; at most {MAX_PLAINTEXT_LEN} fit in one record",
            plaintext.len()
        )));
    }

    let salt: [u8; SALT_LEN] = rand::random();
    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let as_public = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(&ua_public);

    let (cek, nonce) = derive_keys(
        shared.raw_secret_bytes().as_slice(),
        auth,
        p256dh,
        as_public.as_bytes(),
        &salt,
    )?;

    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(PADDING_DELIMITER);

    let sealed = Aes128Gcm::new_from_slice(&cek)
        .map_err(crypto_err)?
        .encrypt(Nonce::from_slice(&nonce), padded.as_slice())
        .map_err(crypto_err)?;

    let mut body = Vec::with_capacity(HEADER_LEN + sealed.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(as_public.as_bytes());
    body.extend_from_slice(&sealed);
    Ok(body)
}

/// Decrypt a record produced by [`encrypt`] with the subscriber's private
/// key and auth secret.
pub fn decrypt(body: &[u8], subscriber: &SecretKey, auth: &[u8]) -> Result<Vec<u8>, ProviderError> {
    check_auth(auth)?;
    if body.len() < HEADER_LEN + TAG_LEN + 1 {
        return Err(ProviderError::Validation(format!(
            "Record of {} bytes is shorter than the minimum",
            body.len()
        )));
    }

    let (salt, rest) = body.split_at(SALT_LEN);
    let (rs, rest) = rest.split_at(4);
    let record_size = u32::from_be_bytes([rs[0], rs[1], rs[2], rs[3]]) as usize;
    let id_len = usize::from(rest[0]);
    if id_len != PUBLIC_KEY_LEN {
        return Err(ProviderError::Validation(format!(
            "Unexpected key id length {id_len}"
        )));
    }
    let (key_id, sealed) = rest[1..].split_at(id_len);
    if sealed.len() > record_size {
        return Err(ProviderError::Validation(
            "Ciphertext exceeds the advertised record size".to_string(),
        ));
    }

    let as_public = PublicKey::from_sec1_bytes(key_id).map_err(crypto_err)?;
    let shared = p256::ecdh::diffie_hellman(subscriber.to_nonzero_scalar(), as_public.as_affine());
    let ua_public = subscriber.public_key().to_encoded_point(false);

    let (cek, nonce) = derive_keys(
        shared.raw_secret_bytes().as_slice(),
        auth,
        ua_public.as_bytes(),
        key_id,
        salt,
    )?;

    let mut padded = Aes128Gcm::new_from_slice(&cek)
        .map_err(crypto_err)?
        .decrypt(Nonce::from_slice(&nonce), sealed)
        .map_err(crypto_err)?;

    match padded.iter().rposition(|b| *b != 0) {
        Some(end) if padded[end] == PADDING_DELIMITER => {
            padded.truncate(end);
            Ok(padded)
        }
        _ => Err(ProviderError::Encryption(
            "Record is missing the padding delimiter".to_string(),
        )),
    }
}
