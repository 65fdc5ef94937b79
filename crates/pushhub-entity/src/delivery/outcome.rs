//! Outcome of one delivery attempt as recorded in the ledger.

use serde::{Deserialize, Serialize};

use super::status::DeliveryStatus;

/// Success or failure of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The provider accepted the message.
    Success,
    /// The attempt failed.
    Failure,
}

/// Result of one attempt, written to the delivery log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// Success or failure.
    pub kind: OutcomeKind,
    /// Provider message identifier.
    pub message_id: Option<String>,
    /// Error text for failures.
    pub error: Option<String>,
    /// Provider HTTP status.
    pub status_code: Option<u16>,
    /// Attempt that produced this outcome.
    pub attempt_count: u32,
}

impl DeliveryOutcome {
    /// A successful attempt.
    pub fn success(message_id: Option<String>, status_code: Option<u16>, attempt_count: u32) -> Self {
        Self {
            kind: OutcomeKind::Success,
            message_id,
            error: None,
            status_code,
            attempt_count,
        }
    }

    /// A failed attempt.
    pub fn failure(error: impl Into<String>, status_code: Option<u16>, attempt_count: u32) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            message_id: None,
            error: Some(error.into()),
            status_code,
            attempt_count,
        }
    }

    /// Log status this outcome maps to.
    pub fn status(&self) -> DeliveryStatus {
        match self.kind {
            OutcomeKind::Success => DeliveryStatus::Sent,
            OutcomeKind::Failure => DeliveryStatus::Failed,
        }
    }

    /// Provider response stored alongside the log row.
    pub fn provider_response(&self) -> Option<serde_json::Value> {
        if self.message_id.is_none() && self.status_code.is_none() {
            return None;
        }
        Some(serde_json::json!({
            "messageId": self.message_id,
            "statusCode": self.status_code,
        }))
    }
}
