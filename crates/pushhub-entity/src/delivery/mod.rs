//! Delivery ledger rows, outcomes, and the counter transition table.

pub mod log;
pub mod outcome;
pub mod status;
pub mod transition;

pub use log::DeliveryLog;
pub use outcome::{DeliveryOutcome, OutcomeKind};
pub use status::DeliveryStatus;
pub use transition::{CounterDelta, LedgerEntry, LedgerTransition, click_transition, transition};
