//! Failure classification and retry backoff for delivery attempts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use pushhub_core::config::{RetryConfig, VapidForbiddenPolicy};
use pushhub_provider::ProviderError;

/// Provider error texts that never succeed without re-registration.
const PERMANENT_PATTERNS: &[&str] = &[
    "unregistered",
    "notregistered",
    "registration-token-not-registered",
    "invalid registration",
    "invalid-registration",
    "invalidregistration",
    "not a valid fcm registration token",
    "baddevicetoken",
    "devicetokennotfortopic",
];

/// Texts identifying a push service rejecting our VAPID credentials.
const VAPID_PATTERNS: &[&str] = &[
    "vapid",
    "authorization header",
    "crypto-key",
    "p256ecdsa",
];

/// Whether a failure can ever succeed on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureClass {
    /// Retrying cannot help.
    Permanent,
    /// May succeed later.
    Transient,
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Enqueue attempt `next_attempt` after `delay`.
    Retry {
        /// Attempt number carried by the retry job.
        next_attempt: u32,
        /// Backoff before the retry becomes runnable.
        delay: Duration,
    },
    /// Budget exhausted.
    Abandon,
}

/// Retry budget and classification rules.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    vapid_policy: VapidForbiddenPolicy,
    vapid_max_attempts: u32,
}

impl RetryPolicy {
    /// Build from configuration.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            vapid_policy: config.vapid_forbidden_policy,
            vapid_max_attempts: config.vapid_forbidden_max_attempts,
        }
    }

    /// Attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Handling of a VAPID rejection for a current-key subscription.
    pub fn vapid_policy(&self) -> VapidForbiddenPolicy {
        self.vapid_policy
    }

    /// Classify a provider response.
    ///
    /// 404 and 410 are permanent, as are unregistered or invalid-token
    /// texts and VAPID credential rejections. Everything else, including a
    /// bare 400 or 403, is transient.
    pub fn classify(&self, status_code: Option<u16>, error: &str) -> FailureClass {
        if matches!(status_code, Some(404 | 410)) {
            return FailureClass::Permanent;
        }
        let text = error.to_ascii_lowercase();
        if PERMANENT_PATTERNS.iter().any(|p| text.contains(p))
            || self.is_vapid_rejection(status_code, error)
        {
            FailureClass::Permanent
        } else {
            FailureClass::Transient
        }
    }

    /// Classify an error raised instead of a provider response.
    pub fn classify_error(&self, error: &ProviderError) -> FailureClass {
        if error.is_retryable() {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        }
    }

    /// Whether the failure is a push service refusing our VAPID credentials.
    pub fn is_vapid_rejection(&self, status_code: Option<u16>, error: &str) -> bool {
        let text = error.to_ascii_lowercase();
        if text.contains("vapid credentials") {
            return true;
        }
        status_code == Some(403) && VAPID_PATTERNS.iter().any(|p| text.contains(p))
    }

    /// Backoff before retrying after attempt `attempt_count` failed:
    /// `base * 2^attempt_count`.
    pub fn delay_for(&self, attempt_count: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Decide whether a transient failure of `attempt_count` is retried.
    pub fn decide(&self, attempt_count: u32) -> RetryDecision {
        if attempt_count < self.max_attempts {
            RetryDecision::Retry {
                next_attempt: attempt_count + 1,
                delay: self.delay_for(attempt_count),
            }
        } else {
            RetryDecision::Abandon
        }
    }

    /// Under [`VapidForbiddenPolicy::Retry`], whether another attempt is allowed.
    pub fn vapid_retry_allowed(&self, attempt_count: u32) -> bool {
        attempt_count < self.vapid_max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_and_not_found_are_permanent() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify(Some(410), "HTTP 410"), FailureClass::Permanent);
        assert_eq!(policy.classify(Some(404), ""), FailureClass::Permanent);
    }

    #[test]
    fn test_server_errors_and_bare_client_errors_are_transient() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.classify(Some(503), "HTTP 503"), FailureClass::Transient);
        assert_eq!(policy.classify(Some(500), ""), FailureClass::Transient);
        assert_eq!(policy.classify(Some(400), "HTTP 400: bad payload"), FailureClass::Transient);
        assert_eq!(policy.classify(Some(403), "HTTP 403: forbidden"), FailureClass::Transient);
        assert_eq!(policy.classify(None, "connection reset"), FailureClass::Transient);
    }

    #[test]
    fn test_provider_texts_are_permanent() {
        let policy = RetryPolicy::default();
        for text in [
            "HTTP 400: BadDeviceToken",
            "HTTP 400: DeviceTokenNotForTopic",
            "NOT_FOUND: Requested entity was not found. (UNREGISTERED)",
            "INVALID_ARGUMENT: The registration token is not a valid FCM registration token",
            "messaging/registration-token-not-registered",
            "Invalid registration",
            "NotRegistered",
        ] {
            assert_eq!(policy.classify(Some(400), text), FailureClass::Permanent, "{text}");
        }
    }

    #[test]
    fn test_vapid_rejection() {
        let policy = RetryPolicy::default();
        assert!(policy.is_vapid_rejection(Some(403), "HTTP 403: invalid VAPID credentials"));
        assert!(policy.is_vapid_rejection(
            Some(403),
            "HTTP 403: the key in the authorization header does not correspond to the sender ID"
        ));
        assert!(policy.is_vapid_rejection(Some(401), "VAPID credentials rejected"));
        assert!(!policy.is_vapid_rejection(Some(403), "HTTP 403: forbidden"));
        assert_eq!(
            policy.classify(Some(403), "HTTP 403: invalid VAPID credentials"),
            FailureClass::Permanent
        );
    }

    #[test]
    fn test_backoff_doubles_from_sixty_seconds() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![60_000, 120_000, 240_000, 480_000, 960_000]);
    }

    #[test]
    fn test_budget_is_exhausted_at_max_attempts() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            assert_eq!(
                policy.decide(attempt),
                RetryDecision::Retry {
                    next_attempt: attempt + 1,
                    delay: policy.delay_for(attempt),
                }
            );
        }
        assert_eq!(policy.decide(5), RetryDecision::Abandon);
        assert_eq!(policy.decide(9), RetryDecision::Abandon);
    }

    #[test]
    fn test_error_classification() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify_error(&ProviderError::Timeout("30s".into())),
            FailureClass::Transient
        );
        assert_eq!(
            policy.classify_error(&ProviderError::Network("reset".into())),
            FailureClass::Transient
        );
        for error in [
            ProviderError::Configuration("missing".into()),
            ProviderError::Validation("bad key".into()),
            ProviderError::Encryption("mismatch".into()),
        ] {
            assert_eq!(policy.classify_error(&error), FailureClass::Permanent);
        }
    }

    #[test]
    fn test_huge_attempt_count_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_for(40) >= policy.delay_for(31));
    }
}
