//! Notification broadcasts and their aggregate counters.

pub mod counters;
pub mod model;
pub mod payload;
pub mod status;

pub use counters::DeliveryCounters;
pub use model::{CreateNotification, DispatchClaim, Notification};
pub use payload::NotificationPayload;
pub use status::NotificationStatus;
