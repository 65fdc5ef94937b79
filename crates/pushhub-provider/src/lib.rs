//! # pushhub-provider
//!
//! Push transports behind one [`PushSender`] contract:
//!
//! - [`webpush`]: VAPID (RFC 8292) authentication and RFC 8291 `aes128gcm`
//!   message encryption, sent over HTTP
//! - [`fcm`]: Firebase Cloud Messaging HTTP v1
//! - [`apns`]: Apple Push Notification service provider API
//!
//! [`ProviderRegistry`] turns stored per-app credentials into a ready sender.

pub mod apns;
pub mod credentials;
pub mod error;
pub mod fcm;
pub mod message;
pub mod registry;
pub mod sender;
pub mod webpush;

pub use credentials::{AesGcmCipher, CredentialCipher, PlaintextCipher};
pub use error::ProviderError;
pub use message::{PushMessage, SendResult};
pub use registry::{ProviderRegistry, SenderResolver};
pub use sender::PushSender;
