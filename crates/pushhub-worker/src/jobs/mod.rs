//! Job handler implementations.

pub mod cleanup;
pub mod delivery;
pub mod dispatch;
pub mod reaper;
pub mod sweep;

pub use cleanup::JobCleanupHandler;
pub use delivery::{DeliveryState, DeliveryWorker};
pub use dispatch::DispatchJobHandler;
pub use reaper::StaleJobReaper;
pub use sweep::ScheduledSweepHandler;

use crate::executor::JobExecutionError;
use pushhub_core::error::AppError;

/// Store errors worth another queue attempt are transient; the rest are internal.
pub(crate) fn classify_app_error(e: AppError) -> JobExecutionError {
    if e.is_transient() {
        JobExecutionError::Transient(e.to_string())
    } else {
        JobExecutionError::Internal(e)
    }
}
