//! Driver cache abstract Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use zonekeeper_provider::DnsProvider;

/// Driver Cache Trait
///
/// Keeps built drivers indexed by provider id, so credentials are decrypted
/// once per provider revision rather than on every call. An entry is only
/// valid for the `updated_at` it was built from.
#[async_trait]
pub trait DriverCache: Send + Sync {
    /// Store a driver
    ///
    /// # Arguments
    /// * `provider_id` - Provider ID
    /// * `revision` - the provider row's `updated_at` at build time
    /// * `driver` - Driver instance
    async fn put(&self, provider_id: String, revision: DateTime<Utc>, driver: Arc<dyn DnsProvider>);

    /// Drop a driver (credentials changed, provider deleted)
    async fn invalidate(&self, provider_id: &str);

    /// Get a driver built from exactly `revision`
    async fn get(&self, provider_id: &str, revision: DateTime<Utc>) -> Option<Arc<dyn DnsProvider>>;

    /// Cached provider ids
    async fn cached_ids(&self) -> Vec<String>;
}

type Entry = (DateTime<Utc>, Arc<dyn DnsProvider>);

/// In-memory driver cache
#[derive(Clone, Default)]
pub struct InMemoryDriverCache {
    drivers: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryDriverCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DriverCache for InMemoryDriverCache {
    async fn put(&self, provider_id: String, revision: DateTime<Utc>, driver: Arc<dyn DnsProvider>) {
        self.drivers.write().await.insert(provider_id, (revision, driver));
    }

    async fn invalidate(&self, provider_id: &str) {
        self.drivers.write().await.remove(provider_id);
    }

    async fn get(&self, provider_id: &str, revision: DateTime<Utc>) -> Option<Arc<dyn DnsProvider>> {
        self.drivers
            .read()
            .await
            .get(provider_id)
            .filter(|(rev, _)| *rev == revision)
            .map(|(_, driver)| Arc::clone(driver))
    }

    async fn cached_ids(&self) -> Vec<String> {
        self.drivers.read().await.keys().cloned().collect()
    }
}
