//! Per-app sender resolution.
//!
//! Stored credentials are fetched through the cache, decrypted, parsed for
//! the platform, and turned into a ready [`PushSender`]. Built senders are
//! kept per (app, platform) and rebuilt when the stored payload changes.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use pushhub_cache::{CacheManager, keys};
use pushhub_core::config::{CredentialConfig, ProviderConfig};
use pushhub_core::traits::CacheProvider;
use pushhub_core::types::AppId;
use pushhub_database::store::CredentialStore;
use pushhub_entity::app::{ProviderCredentials, WebPushCredentials};
use pushhub_entity::device::Platform;

use crate::apns::ApnsSender;
use crate::credentials::{CredentialCipher, cipher_from_config};
use crate::error::ProviderError;
use crate::fcm::FcmSender;
use crate::sender::PushSender;
use crate::webpush::{VapidSigner, WebPushCodec, WebPushSender};

/// Source of ready senders, consumed by the delivery worker.
#[async_trait]
pub trait SenderResolver: Send + Sync + std::fmt::Debug {
    /// Sender for an app's platform. Missing or unusable credentials are a
    /// configuration error; a VAPID key mismatch is an encryption error.
    async fn resolve(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> Result<Arc<dyn PushSender>, ProviderError>;

    /// VAPID public key currently configured for the app, if any.
    async fn webpush_public_key(&self, app_id: AppId) -> Result<Option<String>, ProviderError>;
}

type SenderKey = (AppId, Platform);

/// Registry of provider senders backed by the credential store.
#[derive(Debug)]
pub struct ProviderRegistry {
    credentials: Arc<dyn CredentialStore>,
    cache: CacheManager,
    cipher: Arc<dyn CredentialCipher>,
    allow_plaintext_fallback: bool,
    config: ProviderConfig,
    client: reqwest::Client,
    senders: DashMap<SenderKey, (String, Arc<dyn PushSender>)>,
}

impl ProviderRegistry {
    /// Create a registry with the cipher selected by `credential_config`.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        cache: CacheManager,
        config: ProviderConfig,
        credential_config: &CredentialConfig,
    ) -> Result<Self, ProviderError> {
        let cipher = cipher_from_config(credential_config)?;
        Self::with_cipher(
            credentials,
            cache,
            config,
            cipher,
            credential_config.allow_plaintext_fallback,
        )
    }

    /// Create a registry with an explicit cipher.
    pub fn with_cipher(
        credentials: Arc<dyn CredentialStore>,
        cache: CacheManager,
        config: ProviderConfig,
        cipher: Arc<dyn CredentialCipher>,
        allow_plaintext_fallback: bool,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            credentials,
            cache,
            cipher,
            allow_plaintext_fallback,
            config,
            client,
            senders: DashMap::new(),
        })
    }

    /// Drop cached credentials and senders of an app after rotation.
    pub async fn invalidate(&self, app_id: AppId) -> Result<(), ProviderError> {
        self.senders.retain(|(app, _), _| *app != app_id);
        let removed = self.cache.delete_pattern(&keys::credentials_pattern(app_id)).await?;
        info!(app_id = %app_id, removed, "Invalidated provider credentials");
        Ok(())
    }

    /// Stored payload for the pair, read through the cache.
    async fn load_payload(&self, app_id: AppId, platform: Platform) -> Result<String, ProviderError> {
        let key = keys::credentials(app_id, platform);
        match self.cache.get(&key).await {
            Ok(Some(payload)) => return Ok(payload),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Credential cache read failed"),
        }

        let row = self.credentials.find(app_id, platform).await?.ok_or_else(|| {
            ProviderError::Configuration(format!(
                "No {platform} credentials configured for app {app_id}"
            ))
        })?;

        if let Err(e) = self.cache.set_default(&key, &row.payload).await {
            warn!(error = %e, "Credential cache write failed");
        }
        Ok(row.payload)
    }

    fn decrypt(&self, app_id: AppId, platform: Platform, payload: &str) -> Result<String, ProviderError> {
        match self.cipher.decrypt(payload) {
            Ok(json) => Ok(json),
            Err(e) if self.allow_plaintext_fallback => {
                warn!(
                    app_id = %app_id,
                    platform = %platform,
                    error = %e,
                    "Credential decryption failed, using stored value as-is"
                );
                Ok(payload.to_string())
            }
            Err(e) => Err(ProviderError::Configuration(format!(
                "Cannot decrypt {platform} credentials for app {app_id}: {e}"
            ))),
        }
    }

    async fn load_credentials(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> Result<(String, ProviderCredentials), ProviderError> {
        let payload = self.load_payload(app_id, platform).await?;
        let json = self.decrypt(app_id, platform, &payload)?;
        let credentials = ProviderCredentials::parse(platform, &json).map_err(|e| {
            ProviderError::Configuration(format!(
                "Malformed {platform} credentials for app {app_id}: {e}"
            ))
        })?;
        Ok((payload, credentials))
    }

    fn webpush_sender(&self, credentials: &WebPushCredentials) -> Result<WebPushSender, ProviderError> {
        let subject = credentials
            .vapid_subject
            .as_deref()
            .unwrap_or(&self.config.webpush.default_subject);
        let signer = VapidSigner::new(&credentials.public_key, &credentials.private_key, subject)?;
        Ok(WebPushSender::new(
            self.client.clone(),
            WebPushCodec::new(signer, &self.config.webpush),
        ))
    }

    fn build(&self, credentials: &ProviderCredentials) -> Result<Arc<dyn PushSender>, ProviderError> {
        Ok(match credentials {
            ProviderCredentials::WebPush(web) => Arc::new(self.webpush_sender(web)?),
            ProviderCredentials::Fcm(fcm) => Arc::new(FcmSender::new(
                self.client.clone(),
                fcm,
                &self.config.fcm,
                self.cache.clone(),
            )?),
            ProviderCredentials::Apns(apns) => Arc::new(ApnsSender::new(
                self.client.clone(),
                apns,
                &self.config.apns,
                self.cache.clone(),
            )?),
        })
    }
}

#[async_trait]
impl SenderResolver for ProviderRegistry {
    async fn resolve(
        &self,
        app_id: AppId,
        platform: Platform,
    ) -> Result<Arc<dyn PushSender>, ProviderError> {
        let payload = self.load_payload(app_id, platform).await?;
        if let Some(entry) = self.senders.get(&(app_id, platform)) {
            if entry.0 == payload {
                return Ok(entry.1.clone());
            }
        }

        let (payload, credentials) = self.load_credentials(app_id, platform).await?;
        let sender = self.build(&credentials)?;
        debug!(app_id = %app_id, platform = %platform, "Built provider sender");
        self.senders
            .insert((app_id, platform), (payload, sender.clone()));
        Ok(sender)
    }

    async fn webpush_public_key(&self, app_id: AppId) -> Result<Option<String>, ProviderError> {
        match self.load_credentials(app_id, Platform::Web).await {
            Ok((_, ProviderCredentials::WebPush(web))) => Ok(Some(web.public_key)),
            Ok(_) => Ok(None),
            Err(ProviderError::Configuration(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
