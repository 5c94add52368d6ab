//! Zonekeeper Core Library
//!
//! Business logic for the zonekeeper DNS / certificate control plane:
//! - Zones, providers and records (Zone / Provider / Record services)
//! - Reconciliation between local records and provider state (Sync service)
//! - ACME DNS-01 issuance and the certificate lifecycle (Certificate manager)
//! - Periodic jobs (Scheduler)
//!
//! Storage and outbound delivery are abstracted behind traits; the app crate
//! supplies the SQLite store, host deployer and notifier.

pub mod config;
pub mod crypto;
pub mod error;
pub mod scheduler;
pub mod services;
pub mod traits;
pub mod types;
pub mod utils;
pub mod worker_pool;

#[cfg(test)]
mod test_utils;

// Re-export common types
pub use config::CoreConfig;
pub use crypto::CredentialVault;
pub use error::{CoreError, CoreResult};
pub use scheduler::{Job, JobSchedule, Scheduler, SchedulerHandle};
pub use services::{Repositories, ServiceContext};
pub use traits::{
    CertificateRepository, ChangeLogRepository, DeploymentRepository, HostDeployer, Notifier,
    ProviderRepository, RecordRepository, ZoneRepository,
};
pub use worker_pool::WorkerPool;
pub use zonekeeper_provider::ProviderRegistry;
