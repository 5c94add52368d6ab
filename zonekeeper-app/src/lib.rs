//! Application bootstrap for zonekeeper.
//!
//! Provides `AppState` (service container), `AppStateBuilder` (adapter injection),
//! the TOML configuration loader and the tracing setup used by `zonekeeperd`.

pub mod adapters;
pub mod config;
pub mod logging;

use std::sync::Arc;

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::services::acme::{
    AcmeIssuer, CertificateIssuer, HickoryPropagationChecker, PropagationChecker,
};
use zonekeeper_core::services::{
    CertificateManager, ProviderService, RecordService, Repositories, ServiceContext,
    SyncService, ZoneService,
};
use zonekeeper_core::traits::{
    CertificateRepository, ChangeLogRepository, DeploymentRepository, HostDeployer, Notifier,
    ProviderRepository, RecordRepository, ZoneRepository,
};
use zonekeeper_core::{CoreConfig, CredentialVault, ProviderRegistry, Scheduler, SchedulerHandle};
use zonekeeper_core::WorkerPool;

use adapters::{DirectoryDeployer, LogNotifier};

/// Application state.
///
/// Holds all services and the shared `ServiceContext`. Built once at startup
/// via `AppStateBuilder`.
pub struct AppState {
    /// Service context (config, repositories, vault, worker pool)
    pub ctx: Arc<ServiceContext>,
    pub zones: ZoneService,
    pub providers: ProviderService,
    pub records: RecordService,
    pub sync: SyncService,
    pub certificates: CertificateManager,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Start the periodic jobs, or `None` when `scheduler.enabled` is off.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_scheduler(&self) -> Option<SchedulerHandle> {
        if !self.ctx.config.scheduler.enabled {
            log::info!("Scheduler disabled by configuration");
            return None;
        }
        let scheduler = Scheduler::standard(
            &self.ctx,
            Arc::clone(&self.notifier),
            Some(self.certificates.clone()),
        );
        Some(scheduler.start())
    }

    /// Close the worker queue and wait for in-flight issuance / deployment tasks.
    pub async fn shutdown(&self) {
        let pending = self.ctx.workers.pending();
        if pending > 0 {
            log::info!("Waiting for {pending} background task(s) to finish");
        }
        self.ctx.workers.shutdown().await;
    }
}

/// Builder for constructing `AppState`.
///
/// # Required
/// - `repositories` (or `store`): persistence for every repository trait
///
/// # Optional
/// - `config`: defaults to `CoreConfig::default()`
/// - `provider_registry`: defaults to `ProviderRegistry::builtin()`
/// - `issuer` / `propagation_checker`: default to the ACME issuer and hickory resolver
/// - `deployer`: defaults to `DirectoryDeployer` under `certificate.deploy_root`
/// - `notifier`: defaults to `LogNotifier`
#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<Arc<CoreConfig>>,
    repositories: Option<Repositories>,
    provider_registry: Option<Arc<ProviderRegistry>>,
    issuer: Option<Arc<dyn CertificateIssuer>>,
    checker: Option<Arc<dyn PropagationChecker>>,
    deployer: Option<Arc<dyn HostDeployer>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl AppStateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: Arc<CoreConfig>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn repositories(mut self, repos: Repositories) -> Self {
        self.repositories = Some(repos);
        self
    }

    /// One store that implements every repository trait.
    #[must_use]
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: ZoneRepository
            + ProviderRepository
            + RecordRepository
            + CertificateRepository
            + DeploymentRepository
            + ChangeLogRepository
            + 'static,
    {
        self.repositories(Repositories::from_store(store))
    }

    #[must_use]
    pub fn provider_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.provider_registry = Some(registry);
        self
    }

    #[must_use]
    pub fn issuer(mut self, issuer: Arc<dyn CertificateIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    #[must_use]
    pub fn propagation_checker(mut self, checker: Arc<dyn PropagationChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    #[must_use]
    pub fn deployer(mut self, deployer: Arc<dyn HostDeployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the `AppState`. Starts the worker pool, so it must run inside a tokio runtime.
    ///
    /// # Errors
    /// - `CoreError::ValidationError` if the repositories are missing
    /// - `CoreError::ConfigError` if the configuration does not validate
    pub fn build(self) -> CoreResult<AppState> {
        let repos = self
            .repositories
            .ok_or_else(|| CoreError::ValidationError("repositories are required".to_string()))?;
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let vault = CredentialVault::new(&config.vault);
        if !vault.has_key() {
            log::warn!("No vault key configured: provider credentials cannot be stored");
        }

        let registry = self
            .provider_registry
            .unwrap_or_else(|| Arc::new(ProviderRegistry::builtin()));
        let issuer = self
            .issuer
            .unwrap_or_else(|| Arc::new(AcmeIssuer::new(&config.acme)));
        let checker = self.checker.unwrap_or_else(|| {
            Arc::new(HickoryPropagationChecker::new(&config.acme.nameservers))
        });
        let deployer = self.deployer.unwrap_or_else(|| {
            Arc::new(DirectoryDeployer::new(config.certificate.deploy_root.clone()))
        });
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier::new()));

        let workers = WorkerPool::new(&config.worker_pool);
        let ctx = Arc::new(ServiceContext::new(
            Arc::clone(&config),
            repos,
            registry,
            vault,
            workers,
        ));

        log::info!(
            "Services ready ({} workers, ACME directory {})",
            config.worker_pool.workers,
            config.acme.directory_url
        );

        Ok(AppState {
            zones: ZoneService::new(Arc::clone(&ctx)),
            providers: ProviderService::new(Arc::clone(&ctx)),
            records: RecordService::new(Arc::clone(&ctx)),
            sync: SyncService::new(Arc::clone(&ctx)),
            certificates: CertificateManager::new(Arc::clone(&ctx), issuer, checker, deployer),
            ctx,
            notifier,
        })
    }
}
