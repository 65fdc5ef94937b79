//! Aggregate delivery counters.

use serde::{Deserialize, Serialize};

use crate::delivery::{CounterDelta, DeliveryStatus};

/// Per-notification aggregates derived from the delivery ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCounters {
    /// Deliveries accepted by a provider.
    pub total_sent: i32,
    /// Deliveries considered delivered.
    pub total_delivered: i32,
    /// Deliveries currently failed.
    pub total_failed: i32,
    /// Deliveries clicked.
    pub total_clicked: i32,
}

impl DeliveryCounters {
    /// Apply a ledger delta, clamping every counter at zero.
    pub fn apply(&mut self, delta: CounterDelta) {
        self.total_sent = (self.total_sent + delta.sent).max(0);
        self.total_delivered = (self.total_delivered + delta.delivered).max(0);
        self.total_failed = (self.total_failed + delta.failed).max(0);
        self.total_clicked = (self.total_clicked + delta.clicked).max(0);
    }

    /// Counters implied by the current status of every delivery log row.
    pub fn fold<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = DeliveryStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut acc, status| {
            if status.is_success() {
                acc.total_sent += 1;
                acc.total_delivered += 1;
            }
            match status {
                DeliveryStatus::Failed => acc.total_failed += 1,
                DeliveryStatus::Clicked => acc.total_clicked += 1,
                DeliveryStatus::Sent | DeliveryStatus::Delivered => {}
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_clamps_at_zero() {
        let mut counters = DeliveryCounters {
            total_sent: 0,
            total_delivered: 1,
            total_failed: 0,
            total_clicked: 0,
        };
        counters.apply(CounterDelta {
            sent: -1,
            delivered: -1,
            failed: -1,
            clicked: 0,
        });
        assert_eq!(counters, DeliveryCounters::default());
    }

    #[test]
    fn test_fold_counts_clicked_as_delivered() {
        let counters = DeliveryCounters::fold([
            DeliveryStatus::Sent,
            DeliveryStatus::Failed,
            DeliveryStatus::Clicked,
            DeliveryStatus::Delivered,
        ]);
        assert_eq!(counters.total_sent, 3);
        assert_eq!(counters.total_delivered, 3);
        assert_eq!(counters.total_failed, 1);
        assert_eq!(counters.total_clicked, 1);
    }
}
