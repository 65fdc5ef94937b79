//! Registered push endpoints.

pub mod model;
pub mod platform;
pub mod status;

pub use model::{Device, RegisterDevice};
pub use platform::Platform;
pub use status::DeviceStatus;
