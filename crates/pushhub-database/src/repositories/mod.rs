//! PostgreSQL implementations of the store traits.

pub mod credential;
pub mod delivery_log;
pub mod device;
pub mod job;
pub mod notification;

pub use credential::CredentialRepository;
pub use delivery_log::DeliveryLogRepository;
pub use device::DeviceRepository;
pub use job::JobRepository;
pub use notification::NotificationRepository;
