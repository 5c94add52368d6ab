//! Storage layer and outbound seam trait definitions

mod certificate_repository;
mod change_log_repository;
mod deployer;
mod driver_cache;
mod notifier;
mod provider_repository;
mod record_repository;
mod zone_repository;

pub use certificate_repository::{CertificateRepository, DeploymentRepository};
pub use change_log_repository::ChangeLogRepository;
pub use deployer::HostDeployer;
pub use driver_cache::{DriverCache, InMemoryDriverCache};
pub use notifier::{Notification, NotificationKind, NotificationLevel, Notifier};
pub use provider_repository::ProviderRepository;
pub use record_repository::RecordRepository;
pub use zone_repository::ZoneRepository;
