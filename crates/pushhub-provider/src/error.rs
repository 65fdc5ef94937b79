//! Provider-layer error type.

use pushhub_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Failure raised before or during a provider call.
///
/// An HTTP error *response* is not a `ProviderError`; senders report it as
/// a failed [`crate::SendResult`] carrying the status code.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Missing or unusable per-app credentials.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    /// Malformed device token, endpoint, or subscriber keys.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Key pair mismatch or a cryptographic failure.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The provider did not answer in time.
    #[error("Provider request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure talking to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// A backing service (credential store, cache) is temporarily unavailable.
    #[error("Dependency unavailable: {0}")]
    Unavailable(String),

    /// Anything else.
    #[error("Internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_) | Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_builder() {
            Self::Validation(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<AppError> for ProviderError {
    fn from(e: AppError) -> Self {
        if e.is_transient() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        let kind = match &e {
            ProviderError::Configuration(_) => ErrorKind::Configuration,
            ProviderError::Validation(_) => ErrorKind::Validation,
            ProviderError::Encryption(_) => ErrorKind::Encryption,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::Network(_) => ErrorKind::ExternalService,
            ProviderError::Unavailable(_) => ErrorKind::ServiceUnavailable,
            ProviderError::Internal(_) => ErrorKind::Internal,
        };
        AppError::with_source(kind, e.to_string(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(ProviderError::Timeout("t".into()).is_retryable());
        assert!(ProviderError::Network("n".into()).is_retryable());
        assert!(ProviderError::Unavailable("db".into()).is_retryable());
        assert!(!ProviderError::Validation("v".into()).is_retryable());
        assert!(!ProviderError::Encryption("e".into()).is_retryable());
        assert!(!ProviderError::Configuration("c".into()).is_retryable());
    }

    #[test]
    fn test_maps_into_app_error_kind() {
        let err: AppError = ProviderError::Encryption("mismatch".into()).into();
        assert_eq!(err.kind, ErrorKind::Encryption);
        let err: AppError = ProviderError::Timeout("slow".into()).into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_transient_app_error_becomes_unavailable() {
        let err: ProviderError = AppError::database("connection reset").into();
        assert!(err.is_retryable());
        let err: ProviderError = AppError::validation("bad").into();
        assert!(!err.is_retryable());
    }
}
