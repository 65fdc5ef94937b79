//! Per-app provider credentials.

pub mod credential;

pub use credential::{
    ApnsCredentials, FcmCredentials, PlatformCredential, ProviderCredentials, WebPushCredentials,
};
