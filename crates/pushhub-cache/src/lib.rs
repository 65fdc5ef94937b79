//! # pushhub-cache
//!
//! Cache providers for PushHub. Two backends are available:
//!
//! - **memory**: In-process cache using [moka](https://crates.io/crates/moka)
//!   with per-entry expiry
//! - **redis**: Redis-backed cache shared by every worker process
//!
//! The engine caches stored provider credentials and short-lived provider
//! auth tokens (FCM OAuth access tokens, APNs provider JWTs).

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::CacheManager;
