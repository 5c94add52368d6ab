//! 测试辅助模块
//!
//! 提供内存存储、mock 驱动、假签发器和便捷的测试工厂方法。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use zonekeeper_provider::{
    DnsProvider, DnsRecord, DnsRecordType, FieldType, PaginatedResponse, PaginationParams,
    ProviderConstructor, ProviderCredentialField, ProviderError, ProviderLimits,
    ProviderMetadata, ProviderRegistry, ProviderType, ProviderZone, RecordData,
    RecordQueryParams, RecordSpec, ZoneStatus as RemoteZoneStatus,
};

use crate::config::{CoreConfig, VaultConfig};
use crate::crypto::{BlobVersion, CredentialVault};
use crate::error::{CoreError, CoreResult};
use crate::services::acme::{
    CertificateIssuer, Dns01Solver, IssueOrder, IssuedBundle, KeySource, PendingChallenge,
    PropagationChecker,
};
use crate::services::certificate::material::parse_certificate;
use crate::services::{CertificateManager, Repositories, ServiceContext};
use crate::traits::{
    CertificateRepository, ChangeLogRepository, DeploymentRepository, HostDeployer, Notification,
    Notifier, ProviderRepository, RecordRepository, ZoneRepository,
};
use crate::types::{
    Actor, CaType, Certificate, CertificateDeployment, CertificateMaterial, CertificatePatch,
    CertificateQuery, CertificateStatus, ChangeLogEntry, ChangeLogQuery, DeploymentStatus,
    HealthStatus, HealthUpdate, KeyType, Provider, ProviderStatus, Record, RecordQuery,
    SyncStatus, Zone, ZoneQuery, ZoneStatus,
};
use crate::worker_pool::WorkerPool;

pub const TEST_TENANT: &str = "t1";

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===== TestEnv =====

/// A fully wired service context over in-memory fakes.
pub struct TestEnv {
    pub ctx: Arc<ServiceContext>,
    pub store: Arc<MemoryStore>,
    /// Registered as the Cloudflare driver; every provider row resolves to it.
    pub mock: Arc<MockDnsProvider>,
    pub issuer: Arc<FakeIssuer>,
    pub deployer: Arc<RecordingDeployer>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_vault_keys(&["test-key"])
    }

    /// Must be called inside a tokio runtime (the worker pool spawns).
    pub fn with_vault_keys(keys: &[&str]) -> Self {
        let mut config = CoreConfig::default();
        config.vault = VaultConfig {
            keys: keys.iter().map(ToString::to_string).collect(),
            require_key: false,
        };
        let config = Arc::new(config);

        let store = Arc::new(MemoryStore::default());
        let mock = Arc::new(MockDnsProvider::new());
        let mut registry = ProviderRegistry::new();
        let driver = Arc::clone(&mock);
        let constructor: ProviderConstructor =
            Arc::new(move |_: &HashMap<String, String>| Ok(driver.clone() as Arc<dyn DnsProvider>));
        registry.register(MockDnsProvider::metadata(), constructor);

        let vault = CredentialVault::new(&config.vault).with_blob_version(BlobVersion::V1);
        let workers = WorkerPool::new(&config.worker_pool);
        let ctx = Arc::new(ServiceContext::new(
            config,
            Repositories::from_store(Arc::clone(&store)),
            Arc::new(registry),
            vault,
            workers,
        ));

        Self {
            ctx,
            store,
            mock,
            issuer: Arc::new(FakeIssuer::default()),
            deployer: Arc::new(RecordingDeployer::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new("alice", "10.0.0.1", TEST_TENANT)
    }

    pub fn certificates(&self) -> CertificateManager {
        CertificateManager::new(
            Arc::clone(&self.ctx),
            self.issuer.clone(),
            Arc::new(StaticPropagationChecker::new(true)),
            self.deployer.clone(),
        )
    }

    // ===== 种子数据（不写审计） =====

    pub async fn seed_provider(&self, name: &str) -> Provider {
        let blob = self.ctx.vault.encrypt_map(&mock_credentials()).unwrap();
        self.insert_provider(name, blob).await
    }

    /// Credentials sealed with `key` alone, as an older deployment would have written them.
    pub async fn seed_provider_sealed_with(&self, name: &str, key: &str) -> Provider {
        let vault = CredentialVault::new(&VaultConfig {
            keys: vec![key.to_string()],
            require_key: false,
        })
        .with_blob_version(BlobVersion::V1);
        let blob = vault.encrypt_map(&mock_credentials()).unwrap();
        self.insert_provider(name, blob).await
    }

    /// Legacy plaintext JSON credentials.
    pub async fn seed_provider_plaintext(&self, name: &str) -> Provider {
        let blob = serde_json::to_string(&mock_credentials()).unwrap();
        self.insert_provider(name, blob).await
    }

    async fn insert_provider(&self, name: &str, credentials_enc: String) -> Provider {
        let now = Utc::now();
        let provider = Provider {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: TEST_TENANT.to_string(),
            name: name.to_string(),
            provider_type: ProviderType::Cloudflare,
            credentials_enc,
            rate_limit: 10,
            concurrency: 5,
            timeout_secs: 10,
            is_default: false,
            status: ProviderStatus::Active,
            health_status: HealthStatus::Unknown,
            last_checked_at: None,
            last_latency_ms: None,
            last_error: None,
            remark: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        ProviderRepository::insert(self.store.as_ref(), &provider, None)
            .await
            .unwrap();
        provider
    }

    pub async fn seed_zone(&self, name: &str, provider_id: Option<&str>) -> Zone {
        let now = Utc::now();
        let zone = Zone {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: TEST_TENANT.to_string(),
            name: name.to_string(),
            status: ZoneStatus::Active,
            registrar_type: None,
            provider_id: provider_id.map(String::from),
            expires_at: None,
            auto_renew: false,
            group_id: None,
            remark: None,
            created_by: "seed".to_string(),
            updated_by: "seed".to_string(),
            created_at: now,
            updated_at: now,
        };
        ZoneRepository::insert(self.store.as_ref(), &zone, None).await.unwrap();
        zone
    }

    pub async fn seed_record(
        &self,
        zone: &Zone,
        name: &str,
        record_type: DnsRecordType,
        value: &str,
    ) -> Record {
        let mut record = local_record(name, record_type, value, 600);
        record.zone_id.clone_from(&zone.id);
        record.provider_id.clone_from(&zone.provider_id);
        RecordRepository::insert(self.store.as_ref(), &record, None)
            .await
            .unwrap();
        record
    }

    /// An issued ACME certificate with sealed self-signed material, under a
    /// `cf` provider and an `example.com` zone (created on first use).
    /// Dates stay at the row defaults; the self-signed validity runs for centuries.
    pub async fn seed_issued_certificate(&self, common_name: &str) -> Certificate {
        let provider = match self.store.provider_named("cf") {
            Some(p) => p,
            None => self.seed_provider("cf").await,
        };
        let zone = match self.store.zone_named("example.com") {
            Some(z) => z,
            None => self.seed_zone("example.com", Some(&provider.id)).await,
        };

        let (cert_pem, key_pem) = self_signed(&[common_name]);
        let parsed = parse_certificate(&cert_pem).unwrap();
        let mut cert = issued_certificate(&uuid::Uuid::new_v4().to_string(), common_name);
        cert.zone_id = Some(zone.id);
        cert.provider_id = Some(provider.id);
        cert.key_type = KeyType::Ecdsa256;
        cert.certificate_enc = Some(self.ctx.vault.encrypt(&cert_pem).unwrap());
        cert.private_key_enc = Some(self.ctx.vault.encrypt(&key_pem).unwrap());
        cert.serial_number = Some(parsed.serial_number);
        cert.fingerprint = Some(parsed.fingerprint);
        self.store.put_certificate(cert.clone());
        cert
    }
}

fn mock_credentials() -> HashMap<String, String> {
    HashMap::from([("apiToken".to_string(), "tok".to_string())])
}

// ===== 工厂函数 =====

pub fn local_record(name: &str, record_type: DnsRecordType, value: &str, ttl: u32) -> Record {
    let now = Utc::now();
    Record {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: TEST_TENANT.to_string(),
        zone_id: "z1".to_string(),
        provider_id: None,
        name: name.to_string(),
        record_type,
        value: value.to_string(),
        ttl,
        priority: None,
        weight: None,
        port: None,
        sync_status: SyncStatus::Pending,
        cloud_record_id: None,
        last_sync_at: None,
        remark: None,
        created_by: "seed".to_string(),
        updated_by: "seed".to_string(),
        created_at: now,
        updated_at: now,
    }
}

pub fn remote_record(id: &str, name: &str, data: RecordData, ttl: u32) -> DnsRecord {
    DnsRecord {
        id: id.to_string(),
        name: name.to_string(),
        ttl,
        data,
    }
}

/// Issued metadata row without material: auto-renew on, 30 day window, 90 days left.
pub fn issued_certificate(id: &str, common_name: &str) -> Certificate {
    let now = Utc::now();
    Certificate {
        id: id.to_string(),
        tenant_id: TEST_TENANT.to_string(),
        zone_id: None,
        provider_id: None,
        common_name: common_name.to_string(),
        subject_alt_names: vec![common_name.to_string()],
        ca_type: CaType::LetsEncrypt,
        status: CertificateStatus::Issued,
        key_type: KeyType::Ecdsa256,
        challenge_type: "dns".to_string(),
        email: Some("ops@example.com".to_string()),
        certificate_enc: None,
        private_key_enc: None,
        chain_enc: None,
        csr_pem: None,
        serial_number: None,
        fingerprint: None,
        issued_at: Some(now),
        expires_at: Some(now + Duration::days(90)),
        auto_renew: true,
        renew_days: 30,
        last_renew_at: None,
        renewed_from: None,
        error_message: None,
        remark: None,
        created_by: "seed".to_string(),
        updated_by: "seed".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn params_for(names: &[&str]) -> CertificateParams {
    let mut params =
        CertificateParams::new(names.iter().map(|n| (*n).to_string()).collect::<Vec<_>>()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, names[0]);
    params.distinguished_name = dn;
    params
}

/// ECDSA P-256 self-signed certificate and its key, CN = first name.
pub fn self_signed(names: &[&str]) -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let cert = params_for(names).self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

pub fn csr_pem(names: &[&str]) -> String {
    let key = KeyPair::generate().unwrap();
    params_for(names).serialize_request(&key).unwrap().pem().unwrap()
}

// ===== MemoryStore =====

#[derive(Default)]
struct Tables {
    zones: Vec<Zone>,
    providers: Vec<Provider>,
    records: Vec<Record>,
    certificates: Vec<Certificate>,
    deployments: Vec<CertificateDeployment>,
    change_logs: Vec<ChangeLogEntry>,
}

impl Tables {
    fn audit(&mut self, entry: Option<&ChangeLogEntry>) {
        if let Some(entry) = entry {
            self.change_logs.push(entry.clone());
        }
    }

    fn clear_other_defaults(&mut self, provider: &Provider) {
        if provider.is_default {
            for other in &mut self.providers {
                if other.tenant_id == provider.tenant_id && other.id != provider.id {
                    other.is_default = false;
                }
            }
        }
    }
}

/// Every repository trait over one mutex-guarded set of tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        guard(&self.tables)
    }

    /// Change log rows in insertion order.
    pub fn audit_entries(&self) -> Vec<ChangeLogEntry> {
        self.tables().change_logs.clone()
    }

    pub fn remove_record(&self, id: &str) {
        self.tables().records.retain(|r| r.id != id);
    }

    pub fn remove_zone(&self, id: &str) {
        self.tables().zones.retain(|z| z.id != id);
    }

    /// Insert or replace by id.
    pub fn put_certificate(&self, cert: Certificate) {
        let mut tables = self.tables();
        match tables.certificates.iter_mut().find(|c| c.id == cert.id) {
            Some(existing) => *existing = cert,
            None => tables.certificates.push(cert),
        }
    }

    pub fn certificate(&self, id: &str) -> Option<Certificate> {
        self.tables().certificates.iter().find(|c| c.id == id).cloned()
    }

    pub fn certificates(&self) -> Vec<Certificate> {
        self.tables().certificates.clone()
    }

    fn provider_named(&self, name: &str) -> Option<Provider> {
        self.tables()
            .providers
            .iter()
            .find(|p| p.tenant_id == TEST_TENANT && p.name == name && p.deleted_at.is_none())
            .cloned()
    }

    fn zone_named(&self, name: &str) -> Option<Zone> {
        self.tables()
            .zones
            .iter()
            .find(|z| z.tenant_id == TEST_TENANT && z.name == name)
            .cloned()
    }
}

fn paged<T: Clone>(items: Vec<T>, page: crate::types::PageRequest) -> (Vec<T>, u64) {
    let page = page.normalized();
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.page_size).unwrap_or(usize::MAX))
        .collect();
    (items, total)
}

#[async_trait]
impl ZoneRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Zone>> {
        Ok(self.tables().zones.iter().find(|z| z.id == id).cloned())
    }

    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Zone>> {
        Ok(self
            .tables()
            .zones
            .iter()
            .find(|z| z.tenant_id == tenant_id && z.name == name)
            .cloned())
    }

    async fn list(&self, query: &ZoneQuery) -> CoreResult<(Vec<Zone>, u64)> {
        let mut zones: Vec<Zone> = self
            .tables()
            .zones
            .iter()
            .filter(|z| query.matches(z))
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(paged(zones, query.page))
    }

    async fn list_by_provider(&self, provider_id: &str) -> CoreResult<Vec<Zone>> {
        Ok(self
            .tables()
            .zones
            .iter()
            .filter(|z| z.provider_id.as_deref() == Some(provider_id))
            .cloned()
            .collect())
    }

    async fn list_expiring(&self, before: DateTime<Utc>) -> CoreResult<Vec<Zone>> {
        Ok(self
            .tables()
            .zones
            .iter()
            .filter(|z| z.expires_at.is_some_and(|exp| exp <= before))
            .cloned()
            .collect())
    }

    async fn insert(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        if tables
            .zones
            .iter()
            .any(|z| z.tenant_id == zone.tenant_id && z.name == zone.name)
        {
            return Err(CoreError::Conflict(format!("zone '{}' already exists", zone.name)));
        }
        tables.zones.push(zone.clone());
        tables.audit(audit);
        Ok(())
    }

    async fn update(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        let existing = tables
            .zones
            .iter_mut()
            .find(|z| z.id == zone.id)
            .ok_or_else(|| CoreError::ZoneNotFound(zone.id.clone()))?;
        *existing = zone.clone();
        tables.audit(audit);
        Ok(())
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.zones.retain(|z| z.id != id);
        tables.audit(audit);
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Provider>> {
        Ok(self.tables().providers.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Provider>> {
        Ok(self
            .tables()
            .providers
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.name == name && p.deleted_at.is_none())
            .cloned())
    }

    async fn list(&self, tenant_id: Option<&str>) -> CoreResult<Vec<Provider>> {
        Ok(self
            .tables()
            .providers
            .iter()
            .filter(|p| p.deleted_at.is_none())
            .filter(|p| tenant_id.is_none_or(|t| p.tenant_id == t))
            .cloned()
            .collect())
    }

    async fn list_active(&self) -> CoreResult<Vec<Provider>> {
        Ok(self
            .tables()
            .providers
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect())
    }

    async fn insert(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.clear_other_defaults(provider);
        tables.providers.push(provider.clone());
        tables.audit(audit);
        Ok(())
    }

    async fn update(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.clear_other_defaults(provider);
        let existing = tables
            .providers
            .iter_mut()
            .find(|p| p.id == provider.id)
            .ok_or_else(|| CoreError::ProviderNotFound(provider.id.clone()))?;
        *existing = provider.clone();
        tables.audit(audit);
        Ok(())
    }

    async fn update_credentials(&self, id: &str, credentials_enc: &str) -> CoreResult<()> {
        let mut tables = self.tables();
        let provider = tables
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::ProviderNotFound(id.to_string()))?;
        provider.credentials_enc = credentials_enc.to_string();
        provider.updated_at = Utc::now();
        Ok(())
    }

    async fn update_health(&self, id: &str, health: &HealthUpdate) -> CoreResult<()> {
        let mut tables = self.tables();
        let provider = tables
            .providers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CoreError::ProviderNotFound(id.to_string()))?;
        provider.health_status = health.status;
        provider.last_checked_at = Some(health.checked_at);
        if health.latency_ms.is_some() {
            provider.last_latency_ms = health.latency_ms;
        }
        provider.last_error.clone_from(&health.error);
        Ok(())
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()> {
        let mut tables = self.tables();
        if let Some(provider) = tables.providers.iter_mut().find(|p| p.id == id) {
            provider.deleted_at = Some(deleted_at);
            provider.is_default = false;
        }
        tables.audit(audit);
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Record>> {
        Ok(self.tables().records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_key(
        &self,
        zone_id: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CoreResult<Option<Record>> {
        Ok(self
            .tables()
            .records
            .iter()
            .find(|r| r.zone_id == zone_id && r.name == name && r.record_type == record_type)
            .cloned())
    }

    async fn list_by_zone(&self, zone_id: &str) -> CoreResult<Vec<Record>> {
        let mut records: Vec<Record> = self
            .tables()
            .records
            .iter()
            .filter(|r| r.zone_id == zone_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| (&a.name, a.record_type).cmp(&(&b.name, b.record_type)));
        Ok(records)
    }

    async fn list(&self, query: &RecordQuery) -> CoreResult<(Vec<Record>, u64)> {
        let mut records: Vec<Record> = self
            .tables()
            .records
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| (&a.name, a.record_type).cmp(&(&b.name, b.record_type)));
        Ok(paged(records, query.page))
    }

    async fn count_by_zone(&self, zone_id: &str) -> CoreResult<u64> {
        Ok(self.tables().records.iter().filter(|r| r.zone_id == zone_id).count() as u64)
    }

    async fn count_by_provider(&self, provider_id: &str) -> CoreResult<u64> {
        Ok(self
            .tables()
            .records
            .iter()
            .filter(|r| r.provider_id.as_deref() == Some(provider_id))
            .count() as u64)
    }

    async fn insert(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.records.push(record.clone());
        tables.audit(audit);
        Ok(())
    }

    async fn update(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        let existing = tables
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| CoreError::RecordNotFound(record.id.clone()))?;
        *existing = Record {
            cloud_record_id: existing.cloud_record_id.take(),
            last_sync_at: existing.last_sync_at,
            ..record.clone()
        };
        tables.audit(audit);
        Ok(())
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.records.retain(|r| r.id != id);
        tables.audit(audit);
        Ok(())
    }

    async fn mark_synced(
        &self,
        id: &str,
        cloud_record_id: Option<&str>,
        status: SyncStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut tables = self.tables();
        if let Some(record) = tables.records.iter_mut().find(|r| r.id == id) {
            if let Some(cloud_id) = cloud_record_id {
                record.cloud_record_id = Some(cloud_id.to_string());
            }
            record.sync_status = status;
            record.last_sync_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Certificate>> {
        Ok(self.certificate(id))
    }

    async fn list(&self, query: &CertificateQuery) -> CoreResult<(Vec<Certificate>, u64)> {
        let mut certs: Vec<Certificate> = self
            .tables()
            .certificates
            .iter()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        certs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paged(certs, query.page))
    }

    async fn list_by_ids(&self, ids: &[String]) -> CoreResult<Vec<Certificate>> {
        Ok(self
            .tables()
            .certificates
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: CertificateStatus) -> CoreResult<Vec<Certificate>> {
        Ok(self
            .tables()
            .certificates
            .iter()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> CoreResult<Vec<Certificate>> {
        Ok(self
            .tables()
            .certificates
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, cert: &Certificate, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.certificates.push(cert.clone());
        tables.audit(audit);
        Ok(())
    }

    async fn transition(
        &self,
        id: &str,
        from: CertificateStatus,
        to: CertificateStatus,
        patch: &CertificatePatch,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<bool> {
        let mut tables = self.tables();
        let Some(cert) = tables
            .certificates
            .iter_mut()
            .find(|c| c.id == id && c.status == from)
        else {
            return Ok(false);
        };
        cert.status = to;
        patch.apply(cert, Utc::now());
        tables.audit(audit);
        Ok(true)
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.certificates.retain(|c| c.id != id);
        tables.audit(audit);
        Ok(())
    }
}

#[async_trait]
impl DeploymentRepository for MemoryStore {
    async fn insert_batch(
        &self,
        deployments: &[CertificateDeployment],
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()> {
        let mut tables = self.tables();
        tables.deployments.extend_from_slice(deployments);
        tables.audit(audit);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> CoreResult<Option<CertificateDeployment>> {
        Ok(self.tables().deployments.iter().find(|d| d.id == id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
        deployed_at: Option<DateTime<Utc>>,
    ) -> CoreResult<()> {
        let mut tables = self.tables();
        if let Some(row) = tables
            .deployments
            .iter_mut()
            .find(|d| d.id == id && d.status == DeploymentStatus::Pending)
        {
            row.status = status;
            row.error_message = error_message.map(String::from);
            row.deployed_at = deployed_at;
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_by_certificate(
        &self,
        certificate_id: &str,
    ) -> CoreResult<Vec<CertificateDeployment>> {
        let mut rows: Vec<CertificateDeployment> = self
            .tables()
            .deployments
            .iter()
            .rev()
            .filter(|d| d.certificate_id == certificate_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn delete_by_certificate(&self, certificate_id: &str) -> CoreResult<u64> {
        let mut tables = self.tables();
        let before = tables.deployments.len();
        tables.deployments.retain(|d| d.certificate_id != certificate_id);
        Ok((before - tables.deployments.len()) as u64)
    }
}

#[async_trait]
impl ChangeLogRepository for MemoryStore {
    async fn append(&self, entry: &ChangeLogEntry) -> CoreResult<()> {
        self.tables().change_logs.push(entry.clone());
        Ok(())
    }

    async fn list(&self, query: &ChangeLogQuery) -> CoreResult<(Vec<ChangeLogEntry>, u64)> {
        let mut entries: Vec<ChangeLogEntry> = self
            .tables()
            .change_logs
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paged(entries, query.page))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let mut tables = self.tables();
        let before = tables.change_logs.len();
        tables.change_logs.retain(|e| e.created_at >= cutoff);
        Ok((before - tables.change_logs.len()) as u64)
    }
}

// ===== MockDnsProvider =====

/// Scripted driver keyed by zone name. Writes to zones never added are accepted.
#[derive(Default)]
pub struct MockDnsProvider {
    zones: Mutex<Vec<String>>,
    records: Mutex<HashMap<String, Vec<DnsRecord>>>,
    next_id: AtomicU32,
    calls: AtomicUsize,
    /// 所有调用都返回此错误
    failure: Mutex<Option<ProviderError>>,
    /// create_record 对指定记录名返回错误
    create_failures: Mutex<HashMap<String, ProviderError>>,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_zone(&self, zone: &str) {
        guard(&self.zones).push(zone.to_string());
    }

    pub fn records(&self, zone: &str) -> Vec<DnsRecord> {
        guard(&self.records).get(zone).cloned().unwrap_or_default()
    }

    pub fn insert_record(&self, zone: &str, name: &str, data: RecordData, ttl: u32) -> DnsRecord {
        let record = DnsRecord {
            id: self.next_record_id(),
            name: name.to_string(),
            ttl,
            data,
        };
        guard(&self.records)
            .entry(zone.to_string())
            .or_default()
            .push(record.clone());
        record
    }

    pub fn fail_all(&self, error: Option<ProviderError>) {
        *guard(&self.failure) = error;
    }

    pub fn fail_create_for(&self, name: &str, error: ProviderError) {
        guard(&self.create_failures).insert(name.to_string(), error);
    }

    /// Primitive driver calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_record_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn enter(&self) -> zonekeeper_provider::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match guard(&self.failure).clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn not_found(record_id: &str) -> ProviderError {
        ProviderError::RecordNotFound {
            provider: "mock".to_string(),
            record_id: record_id.to_string(),
            raw_message: None,
        }
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    fn id(&self) -> &'static str {
        "mock"
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            id: ProviderType::Cloudflare,
            name: "Mock".to_string(),
            description: "In-memory test driver".to_string(),
            required_fields: vec![ProviderCredentialField {
                key: "apiToken".to_string(),
                label: "API Token".to_string(),
                field_type: FieldType::Password,
                help_text: None,
            }],
            limits: ProviderLimits {
                max_page_size_zones: 100,
                max_page_size_records: 100,
            },
        }
    }

    async fn validate_credentials(&self) -> zonekeeper_provider::Result<bool> {
        self.enter()?;
        Ok(true)
    }

    async fn list_zones_page(
        &self,
        params: &PaginationParams,
    ) -> zonekeeper_provider::Result<PaginatedResponse<ProviderZone>> {
        self.enter()?;
        let zones: Vec<ProviderZone> = guard(&self.zones)
            .iter()
            .map(|name| ProviderZone {
                id: format!("zone-{name}"),
                name: name.clone(),
                status: RemoteZoneStatus::Active,
                record_count: None,
            })
            .collect();
        let total = u32::try_from(zones.len()).unwrap_or(u32::MAX);
        Ok(PaginatedResponse::new(zones, params.page, total.max(1), total))
    }

    async fn list_records_page(
        &self,
        zone: &str,
        params: &RecordQueryParams,
    ) -> zonekeeper_provider::Result<PaginatedResponse<DnsRecord>> {
        self.enter()?;
        let records: Vec<DnsRecord> = self
            .records(zone)
            .into_iter()
            .filter(|r| params.name.as_deref().is_none_or(|n| n == r.name))
            .filter(|r| params.record_type.is_none_or(|t| t == r.data.record_type()))
            .collect();
        let total = u32::try_from(records.len()).unwrap_or(u32::MAX);
        Ok(PaginatedResponse::new(records, params.pagination.page, total.max(1), total))
    }

    async fn create_record(
        &self,
        zone: &str,
        spec: &RecordSpec,
    ) -> zonekeeper_provider::Result<DnsRecord> {
        self.enter()?;
        if let Some(e) = guard(&self.create_failures).get(&spec.name).cloned() {
            return Err(e);
        }
        Ok(self.insert_record(zone, &spec.name, spec.data.clone(), spec.ttl))
    }

    async fn update_record(
        &self,
        zone: &str,
        record_id: &str,
        spec: &RecordSpec,
    ) -> zonekeeper_provider::Result<DnsRecord> {
        self.enter()?;
        let mut records = guard(&self.records);
        let record = records
            .get_mut(zone)
            .and_then(|rs| rs.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| Self::not_found(record_id))?;
        record.name.clone_from(&spec.name);
        record.ttl = spec.ttl;
        record.data = spec.data.clone();
        Ok(record.clone())
    }

    async fn delete_record_by_id(&self, zone: &str, record_id: &str) -> zonekeeper_provider::Result<()> {
        self.enter()?;
        let mut records = guard(&self.records);
        let rows = records.get_mut(zone).ok_or_else(|| Self::not_found(record_id))?;
        let before = rows.len();
        rows.retain(|r| r.id != record_id);
        if rows.len() == before {
            return Err(Self::not_found(record_id));
        }
        Ok(())
    }
}

// ===== 传播检查 / 签发 / 部署 / 通知 =====

pub struct StaticPropagationChecker {
    visible: bool,
}

impl StaticPropagationChecker {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }
}

#[async_trait]
impl PropagationChecker for StaticPropagationChecker {
    async fn is_visible(&self, _fqdn: &str, _expected: &str) -> CoreResult<bool> {
        Ok(self.visible)
    }
}

/// Reports a value as visible only after `misses` lookups of that value came back empty.
pub struct SlowPropagationChecker {
    misses: usize,
    seen: Mutex<HashMap<(String, String), usize>>,
    queries: AtomicUsize,
}

impl SlowPropagationChecker {
    pub fn new(misses: usize) -> Self {
        Self {
            misses,
            seen: Mutex::new(HashMap::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropagationChecker for SlowPropagationChecker {
    async fn is_visible(&self, fqdn: &str, expected: &str) -> CoreResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut seen = guard(&self.seen);
        let count = seen.entry((fqdn.to_string(), expected.to_string())).or_default();
        *count += 1;
        Ok(*count > self.misses)
    }
}

/// Runs the DNS-01 steps against the solver, then self-signs instead of asking a CA.
#[derive(Default)]
pub struct FakeIssuer {
    failure: Mutex<Option<String>>,
    revoked: AtomicUsize,
}

impl FakeIssuer {
    /// Fail every later order with this message, after the challenges were presented.
    pub fn fail_with(&self, message: Option<&str>) {
        *guard(&self.failure) = message.map(String::from);
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::SeqCst)
    }

    fn sign(order: &IssueOrder) -> CoreResult<IssuedBundle> {
        let names: Vec<&str> = order.domains.iter().map(String::as_str).collect();
        let key = KeyPair::generate().map_err(|e| CoreError::CryptoError(e.to_string()))?;
        let cert = params_for(&names)
            .self_signed(&key)
            .map_err(|e| CoreError::CertificateError(e.to_string()))?;
        Ok(IssuedBundle {
            certificate_pem: cert.pem(),
            chain_pem: None,
            private_key_pem: match order.key {
                KeySource::Generate(_) => Some(key.serialize_pem()),
                KeySource::Csr(_) => None,
            },
        })
    }
}

#[async_trait]
impl CertificateIssuer for FakeIssuer {
    async fn issue(&self, order: &IssueOrder, solver: Arc<dyn Dns01Solver>) -> CoreResult<IssuedBundle> {
        if order.domains.is_empty() {
            return Err(CoreError::ValidationError("order has no identifiers".into()));
        }

        let challenges: Vec<PendingChallenge> = order
            .domains
            .iter()
            .enumerate()
            .map(|(i, d)| PendingChallenge {
                domain: d.clone(),
                token: format!("tok-{i}"),
                key_authorization: format!("ka-{i}-{d}"),
            })
            .collect();
        let presented = solver.present_batch(&challenges).await;

        let failure = guard(&self.failure).clone();
        let result = match (presented, failure) {
            (Err(e), _) => Err(e),
            (Ok(()), Some(message)) => Err(CoreError::AcmeError(message)),
            (Ok(()), None) => Self::sign(order),
        };

        solver.cleanup_batch(&challenges).await;
        result
    }

    async fn revoke(&self, _email: Option<&str>, _certificate_pem: &str) -> CoreResult<()> {
        self.revoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDeployer {
    deployed: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingDeployer {
    pub fn fail_host(&self, host: &str) {
        guard(&self.failing).insert(host.to_string());
    }

    /// Hosts that received material, sorted.
    pub fn deployed(&self) -> Vec<String> {
        let mut hosts = guard(&self.deployed).clone();
        hosts.sort();
        hosts
    }
}

#[async_trait]
impl HostDeployer for RecordingDeployer {
    async fn deploy(
        &self,
        deployment: &CertificateDeployment,
        _material: &CertificateMaterial,
    ) -> CoreResult<()> {
        if guard(&self.failing).contains(&deployment.host) {
            return Err(CoreError::CertificateError(format!(
                "{} refused the connection",
                deployment.host
            )));
        }
        guard(&self.deployed).push(deployment.host.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        guard(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> CoreResult<()> {
        guard(&self.sent).push(notification.clone());
        Ok(())
    }
}
