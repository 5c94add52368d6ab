//! 业务逻辑服务层

pub mod acme;
pub mod certificate;
mod provider_service;
mod record_service;
mod sync_service;
mod zone_service;

pub use certificate::CertificateManager;
pub use provider_service::ProviderService;
pub use record_service::RecordService;
pub use sync_service::{compare_records, SyncService};
pub use zone_service::ZoneService;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use zonekeeper_provider::{DnsProvider, ProviderError, ProviderRegistry};

use crate::config::CoreConfig;
use crate::crypto::CredentialVault;
use crate::error::{CoreError, CoreResult};
use crate::traits::{
    CertificateRepository, ChangeLogRepository, DeploymentRepository, DriverCache,
    InMemoryDriverCache, ProviderRepository, RecordRepository, ZoneRepository,
};
use crate::types::{ChangeLogEntry, HealthStatus, HealthUpdate, Provider, Zone};
use crate::utils::KeyedLocks;
use crate::worker_pool::WorkerPool;

/// Storage handles, one per repository trait.
#[derive(Clone)]
pub struct Repositories {
    pub zones: Arc<dyn ZoneRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub records: Arc<dyn RecordRepository>,
    pub certificates: Arc<dyn CertificateRepository>,
    pub deployments: Arc<dyn DeploymentRepository>,
    pub change_logs: Arc<dyn ChangeLogRepository>,
}

impl Repositories {
    /// Use one store that implements every repository trait.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: ZoneRepository
            + ProviderRepository
            + RecordRepository
            + CertificateRepository
            + DeploymentRepository
            + ChangeLogRepository
            + 'static,
    {
        Self {
            zones: store.clone(),
            providers: store.clone(),
            records: store.clone(),
            certificates: store.clone(),
            deployments: store.clone(),
            change_logs: store,
        }
    }
}

/// 服务上下文 - 持有所有依赖
///
/// 平台层创建此上下文并注入存储实现；各服务共享同一个 `Arc<ServiceContext>`。
pub struct ServiceContext {
    pub config: Arc<CoreConfig>,
    pub repos: Repositories,
    /// 驱动构造注册表
    pub registry: Arc<ProviderRegistry>,
    pub vault: CredentialVault,
    pub workers: WorkerPool,
    pub drivers: Arc<dyn DriverCache>,
    /// 正在续期的证书 id
    pub(crate) renewals: KeyedLocks,
    /// 同一条记录的推送串行执行
    pub(crate) record_pushes: KeyedLocks,
}

impl ServiceContext {
    #[must_use]
    pub fn new(
        config: Arc<CoreConfig>,
        repos: Repositories,
        registry: Arc<ProviderRegistry>,
        vault: CredentialVault,
        workers: WorkerPool,
    ) -> Self {
        Self {
            config,
            repos,
            registry,
            vault,
            workers,
            drivers: Arc::new(InMemoryDriverCache::new()),
            renewals: KeyedLocks::new(),
            record_pushes: KeyedLocks::new(),
        }
    }

    /// Zone owned by `tenant_id`; another tenant's zone is reported as missing.
    pub async fn get_zone(&self, zone_id: &str, tenant_id: &str) -> CoreResult<Zone> {
        self.repos
            .zones
            .find_by_id(zone_id)
            .await?
            .filter(|z| z.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::ZoneNotFound(zone_id.to_string()))
    }

    /// Live provider; `tenant_id = None` skips the ownership check (system jobs).
    pub async fn get_provider(
        &self,
        provider_id: &str,
        tenant_id: Option<&str>,
    ) -> CoreResult<Provider> {
        self.repos
            .providers
            .find_by_id(provider_id)
            .await?
            .filter(|p| p.deleted_at.is_none())
            .filter(|p| tenant_id.is_none_or(|t| p.tenant_id == t))
            .ok_or_else(|| CoreError::ProviderNotFound(provider_id.to_string()))
    }

    /// Driver for a provider row, built from its decrypted credentials.
    ///
    /// Cached per provider revision (`updated_at`).
    pub async fn provider_driver(&self, provider: &Provider) -> CoreResult<Arc<dyn DnsProvider>> {
        if let Some(driver) = self.drivers.get(&provider.id, provider.updated_at).await {
            return Ok(driver);
        }

        let credentials = self
            .vault
            .decrypt_provider(provider, &self.repos.providers)
            .await?;
        let driver = self.registry.create(provider.provider_type, &credentials)?;
        self.drivers
            .put(provider.id.clone(), provider.updated_at, Arc::clone(&driver))
            .await;
        Ok(driver)
    }

    /// Deadline for one driver call: the provider's own knob, else the global one.
    pub fn request_timeout(&self, provider: &Provider) -> Duration {
        if provider.timeout_secs > 0 {
            Duration::from_secs(provider.timeout_secs)
        } else {
            self.config.provider.request_timeout()
        }
    }

    /// 处理 Provider 错误，如果是凭证失效则标记服务商为不健康
    pub async fn handle_provider_error(&self, provider_id: &str, err: ProviderError) -> CoreError {
        if err.is_auth_failure() {
            let update = HealthUpdate {
                status: HealthStatus::Unhealthy,
                checked_at: Utc::now(),
                latency_ms: None,
                error: Some(err.to_string()),
            };
            match self.repos.providers.update_health(provider_id, &update).await {
                Ok(()) => log::warn!("Provider {provider_id} marked unhealthy: {err}"),
                Err(e) => log::error!("Failed to mark provider {provider_id} unhealthy: {e}"),
            }
        }
        CoreError::Provider(err)
    }

    /// Standalone audit write; failures are logged only.
    pub async fn audit(&self, entry: &ChangeLogEntry) {
        if let Err(e) = self.repos.change_logs.append(entry).await {
            log::warn!(
                "Failed to write change log for {} {}: {e}",
                entry.resource_type,
                entry.resource_id
            );
        }
    }
}

/// Log an error at `warn` when expected, `error` otherwise.
pub(crate) fn log_core_error(context: &str, err: &CoreError) {
    if err.is_expected() {
        log::warn!("{context}: {err}");
    } else {
        log::error!("{context}: {err}");
    }
}
