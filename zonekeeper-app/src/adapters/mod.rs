//! Storage and outbound adapters for the zonekeeper daemon.

mod directory_deployer;
mod log_notifier;

pub use directory_deployer::DirectoryDeployer;
pub use log_notifier::LogNotifier;

#[cfg(feature = "sqlite-store")]
mod sqlite;

#[cfg(feature = "sqlite-store")]
pub use sqlite::SqliteStore;
