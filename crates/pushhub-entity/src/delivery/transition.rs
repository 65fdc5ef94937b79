//! Counter transition table for the delivery ledger.
//!
//! Aggregates are adjusted from the *previous* status of a pair to the new
//! one, so replays and retries never double count. Both store backends
//! apply exactly these deltas.

use serde::{Deserialize, Serialize};

use super::status::DeliveryStatus;

/// Signed adjustment applied to notification counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    /// Change to `total_sent`.
    pub sent: i32,
    /// Change to `total_delivered`.
    pub delivered: i32,
    /// Change to `total_failed`.
    pub failed: i32,
    /// Change to `total_clicked`.
    pub clicked: i32,
}

impl CounterDelta {
    /// Whether applying the delta changes nothing.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    const fn new(sent: i32, delivered: i32, failed: i32, clicked: i32) -> Self {
        Self {
            sent,
            delivered,
            failed,
            clicked,
        }
    }
}

/// What recording an outcome does to a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTransition {
    /// Status the row holds afterwards.
    pub status: DeliveryStatus,
    /// Counter adjustment.
    pub delta: CounterDelta,
    /// Whether the row is rewritten at all.
    pub write: bool,
}

/// Result of recording one outcome, returned by the ledger stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Status before the call; `None` for a first attempt.
    pub previous: Option<DeliveryStatus>,
    /// Status after the call.
    pub current: DeliveryStatus,
    /// Counter adjustment that was applied.
    pub delta: CounterDelta,
}

/// Transition from `previous` (absent for a first attempt) to an attempt
/// outcome of `next` (`Sent` or `Failed`).
pub fn transition(previous: Option<DeliveryStatus>, next: DeliveryStatus) -> LedgerTransition {
    use DeliveryStatus::*;

    let (status, delta, write) = match (previous, next) {
        (Some(Clicked), _) => (Clicked, CounterDelta::default(), false),
        (None, Failed) => (Failed, CounterDelta::new(0, 0, 1, 0), true),
        (None, _) => (Sent, CounterDelta::new(1, 1, 0, 0), true),
        (Some(Failed), Failed) => (Failed, CounterDelta::default(), true),
        (Some(Failed), _) => (Sent, CounterDelta::new(1, 1, -1, 0), true),
        (Some(Sent | Delivered), Failed) => (Failed, CounterDelta::new(-1, -1, 1, 0), true),
        (Some(Delivered), _) => (Delivered, CounterDelta::default(), true),
        (Some(Sent), _) => (Sent, CounterDelta::default(), true),
    };

    LedgerTransition {
        status,
        delta,
        write,
    }
}

/// Counter adjustment for a click on a pair currently in `previous`.
///
/// Returns `None` when the click changes nothing (no row, or already
/// clicked). A click on a failed row proves delivery and moves it across.
pub fn click_transition(previous: Option<DeliveryStatus>) -> Option<CounterDelta> {
    match previous? {
        DeliveryStatus::Clicked => None,
        DeliveryStatus::Failed => Some(CounterDelta::new(1, 1, -1, 1)),
        DeliveryStatus::Sent | DeliveryStatus::Delivered => Some(CounterDelta::new(0, 0, 0, 1)),
    }
}
