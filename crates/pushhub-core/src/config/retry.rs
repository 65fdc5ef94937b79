//! Delivery retry configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry budget and backoff for delivery jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts allowed before a transiently failing delivery is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base; the delay for attempt `n` is `base * 2^n`.
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: u64,
    /// Handling of a 403 / VAPID rejection when the device fingerprint
    /// matches the app's current key.
    #[serde(default)]
    pub vapid_forbidden_policy: VapidForbiddenPolicy,
    /// Attempt ceiling used by [`VapidForbiddenPolicy::Retry`].
    #[serde(default = "default_vapid_forbidden_max_attempts")]
    pub vapid_forbidden_max_attempts: u32,
}

impl RetryConfig {
    /// Backoff base as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_seconds)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_seconds: default_base_delay(),
            vapid_forbidden_policy: VapidForbiddenPolicy::default(),
            vapid_forbidden_max_attempts: default_vapid_forbidden_max_attempts(),
        }
    }
}

/// What to do when a push service rejects our VAPID credentials for a
/// subscription that was created under the current key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VapidForbiddenPolicy {
    /// Mark the device inactive and stop.
    #[default]
    Deactivate,
    /// Stop without touching the device; an operator resolves it.
    Manual,
    /// Retry with backoff up to `vapid_forbidden_max_attempts`, then deactivate.
    Retry,
}

impl fmt::Display for VapidForbiddenPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deactivate => write!(f, "deactivate"),
            Self::Manual => write!(f, "manual"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> u64 {
    60
}

fn default_vapid_forbidden_max_attempts() -> u32 {
    2
}
