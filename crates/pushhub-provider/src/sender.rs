//! The uniform sender contract.

use std::fmt;

use async_trait::async_trait;

use pushhub_entity::device::Platform;

use crate::error::ProviderError;
use crate::message::{PushMessage, SendResult};

/// A ready-to-use transport for one app and platform.
///
/// `Ok` carries the provider's answer, including rejections. `Err` means
/// no answer was obtained (bad input, key problems, timeouts, network).
#[async_trait]
pub trait PushSender: Send + Sync + fmt::Debug {
    /// Platform this sender delivers to.
    fn platform(&self) -> Platform;

    /// Deliver one message.
    async fn send(&self, message: &PushMessage) -> Result<SendResult, ProviderError>;
}

/// Error text for a non-success HTTP response.
pub(crate) fn http_error_text(status: u16, detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {detail}")
    }
}
