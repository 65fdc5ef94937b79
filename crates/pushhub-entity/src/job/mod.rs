//! Durable queue job entities.

pub mod model;
pub mod payload;
pub mod status;

pub use model::{CreateJob, Job};
pub use payload::{DeliveryJob, DispatchJob, job_types};
pub use status::{JobPriority, JobStatus};
