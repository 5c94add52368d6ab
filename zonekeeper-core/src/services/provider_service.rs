//! 服务商账号管理服务
//!
//! 负责账号的增删改查、凭证加密保存、连通性探测、健康检查、域名导入与密钥轮换

use std::sync::Arc;

use chrono::Utc;
use zonekeeper_provider::{with_deadline, HealthCheck, ProviderMetadata, RegistryError, ZoneFilter};

use crate::error::{CoreError, CoreResult};
use crate::services::{log_core_error, ServiceContext};
use crate::types::{
    resource, Actor, BatchFailure, BatchOutcome, ChangeAction, ChangeLogEntry,
    CreateProviderRequest, HealthReport, HealthStatus, HealthUpdate, Provider, ProviderStatus,
    UpdateProviderRequest, Zone, ZoneImportResult, ZoneStatus,
};
use crate::utils::normalize_zone_name;

const DEFAULT_RATE_LIMIT: u32 = 10;
const DEFAULT_CONCURRENCY: u32 = 5;

/// 服务商账号管理服务
pub struct ProviderService {
    ctx: Arc<ServiceContext>,
}

impl ProviderService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// 所有已注册驱动的元数据
    pub fn metadata(&self) -> Vec<ProviderMetadata> {
        self.ctx.registry.all_metadata()
    }

    /// 创建服务商账号
    ///
    /// 凭证按驱动元数据校验后加密保存，明文不落库。
    pub async fn create_provider(
        &self,
        request: CreateProviderRequest,
        actor: &Actor,
    ) -> CoreResult<Provider> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::ValidationError("provider name is required".into()));
        }
        self.ensure_name_free(&actor.tenant_id, &name, None).await?;
        self.ctx
            .registry
            .validate(request.provider_type, &request.credentials)
            .map_err(|e| CoreError::from(RegistryError::Credentials(e)))?;
        let credentials_enc = self.ctx.vault.encrypt_map(&request.credentials)?;

        let now = Utc::now();
        let provider = Provider {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            name,
            provider_type: request.provider_type,
            credentials_enc,
            rate_limit: request.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
            concurrency: request.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1),
            timeout_secs: request
                .timeout_secs
                .unwrap_or(self.ctx.config.provider.request_timeout_secs),
            is_default: request.is_default,
            status: ProviderStatus::Active,
            health_status: HealthStatus::Unknown,
            last_checked_at: None,
            last_latency_ms: None,
            last_error: None,
            remark: request.remark,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let audit = ChangeLogEntry::new(actor, resource::PROVIDER, &provider.id, ChangeAction::Create)
            .after(&provider);
        self.ctx.repos.providers.insert(&provider, Some(&audit)).await?;
        log::info!(
            "Provider {} ({}) created by {}",
            provider.name,
            provider.provider_type,
            actor.id
        );
        Ok(provider)
    }

    pub async fn get_provider(&self, provider_id: &str, tenant_id: &str) -> CoreResult<Provider> {
        self.ctx.get_provider(provider_id, Some(tenant_id)).await
    }

    pub async fn list_providers(&self, tenant_id: &str) -> CoreResult<Vec<Provider>> {
        self.ctx.repos.providers.list(Some(tenant_id)).await
    }

    /// 更新服务商账号；凭证变更时重新校验并重新加密
    pub async fn update_provider(
        &self,
        provider_id: &str,
        request: UpdateProviderRequest,
        actor: &Actor,
    ) -> CoreResult<Provider> {
        let before = self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;
        let mut provider = before.clone();

        if let Some(name) = request.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CoreError::ValidationError("provider name is required".into()));
            }
            if name != provider.name {
                self.ensure_name_free(&actor.tenant_id, &name, Some(provider_id)).await?;
            }
            provider.name = name;
        }
        if let Some(credentials) = &request.credentials {
            self.ctx
                .registry
                .validate(provider.provider_type, credentials)
                .map_err(|e| CoreError::from(RegistryError::Credentials(e)))?;
            provider.credentials_enc = self.ctx.vault.encrypt_map(credentials)?;
            // 凭证已换，旧的健康结论作废
            provider.health_status = HealthStatus::Unknown;
            provider.last_error = None;
        }
        if let Some(rate_limit) = request.rate_limit {
            provider.rate_limit = rate_limit;
        }
        if let Some(concurrency) = request.concurrency {
            provider.concurrency = concurrency.max(1);
        }
        if let Some(timeout_secs) = request.timeout_secs {
            provider.timeout_secs = timeout_secs;
        }
        if let Some(is_default) = request.is_default {
            provider.is_default = is_default;
        }
        if let Some(status) = request.status {
            provider.status = status;
        }
        if request.remark.is_some() {
            provider.remark = request.remark;
        }
        provider.updated_at = Utc::now();

        let mut audit =
            ChangeLogEntry::new(actor, resource::PROVIDER, provider_id, ChangeAction::Update)
                .before(&before)
                .after(&provider);
        if request.credentials.is_some() {
            audit = audit.describe("credentials replaced");
        }
        self.ctx.repos.providers.update(&provider, Some(&audit)).await?;
        self.ctx.drivers.invalidate(provider_id).await;
        Ok(provider)
    }

    /// 软删除服务商账号。仍被域名或记录引用时拒绝。
    pub async fn delete_provider(&self, provider_id: &str, actor: &Actor) -> CoreResult<()> {
        let provider = self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;

        let zones = self.ctx.repos.zones.list_by_provider(provider_id).await?;
        if !zones.is_empty() {
            return Err(CoreError::Conflict(format!(
                "provider '{}' is still linked to {} zone(s)",
                provider.name,
                zones.len()
            )));
        }
        let records = self.ctx.repos.records.count_by_provider(provider_id).await?;
        if records > 0 {
            return Err(CoreError::Conflict(format!(
                "provider '{}' is still referenced by {records} record(s)",
                provider.name
            )));
        }

        let audit = ChangeLogEntry::new(actor, resource::PROVIDER, provider_id, ChangeAction::Delete)
            .before(&provider);
        self.ctx
            .repos
            .providers
            .soft_delete(provider_id, Utc::now(), Some(&audit))
            .await?;
        self.ctx.drivers.invalidate(provider_id).await;
        log::info!("Provider {} deleted by {}", provider.name, actor.id);
        Ok(())
    }

    /// 探测连通性并持久化健康状态
    pub async fn test_provider(&self, provider_id: &str, tenant_id: &str) -> CoreResult<HealthCheck> {
        let provider = self.ctx.get_provider(provider_id, Some(tenant_id)).await?;
        Ok(self.check_health(&provider).await)
    }

    /// 对所有活跃服务商做健康检查。单个失败不影响其余。
    pub async fn check_all_health(&self) -> CoreResult<HealthReport> {
        let providers = self.ctx.repos.providers.list_active().await?;
        let mut report = HealthReport::default();

        for provider in providers {
            let result = self.check_health(&provider).await;
            if result.success {
                report.healthy += 1;
            } else {
                report.unhealthy += 1;
                report.failures.push(BatchFailure {
                    id: provider.id.clone(),
                    error: result.error_message.unwrap_or_default(),
                });
            }
        }

        log::info!(
            "Health check finished: {} healthy, {} unhealthy",
            report.healthy,
            report.unhealthy
        );
        Ok(report)
    }

    /// 从服务商导入域名：新建缺失的本地域名，或把已有域名关联到该服务商
    pub async fn import_zones(
        &self,
        provider_id: &str,
        actor: &Actor,
    ) -> CoreResult<ZoneImportResult> {
        let provider = self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;
        let driver = self.ctx.provider_driver(&provider).await?;
        let remote = match with_deadline(
            driver.id(),
            self.ctx.request_timeout(&provider),
            driver.list_zones(&ZoneFilter::default()),
        )
        .await
        {
            Ok(zones) => zones,
            Err(e) => return Err(self.ctx.handle_provider_error(provider_id, e).await),
        };

        let mut result = ZoneImportResult::default();
        for remote_zone in remote {
            match self.import_one(&remote_zone.name, &provider, actor).await {
                Ok(ImportOutcome::Created(name)) => result.created.push(name),
                Ok(ImportOutcome::Relinked(name)) => result.relinked.push(name),
                Ok(ImportOutcome::Unchanged(name)) => result.unchanged.push(name),
                Err(e) => {
                    log_core_error(&format!("Failed to import zone {}", remote_zone.name), &e);
                    result.failures.push(BatchFailure {
                        id: remote_zone.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Imported zones from provider {}: {} created, {} relinked, {} unchanged, {} failed",
            provider.name,
            result.created.len(),
            result.relinked.len(),
            result.unchanged.len(),
            result.failures.len()
        );
        Ok(result)
    }

    /// 用当前主密钥重新加密凭证。
    ///
    /// `tenant_id = None` covers every tenant. Blobs already sealed by the
    /// primary key are skipped and not counted.
    pub async fn rotate_credentials(&self, tenant_id: Option<&str>) -> CoreResult<BatchOutcome> {
        let providers = self.ctx.repos.providers.list(tenant_id).await?;
        let mut outcome = BatchOutcome::default();

        for provider in providers {
            let vault = self.ctx.vault.clone();
            let blob = provider.credentials_enc.clone();
            let resealed = tokio::task::spawn_blocking(move || vault.reseal(&blob))
                .await
                .map_err(|e| CoreError::CryptoError(e.to_string()))
                .and_then(|r| r);

            match resealed {
                Ok(None) => {}
                Ok(Some(blob)) => {
                    match self
                        .ctx
                        .repos
                        .providers
                        .update_credentials(&provider.id, &blob)
                        .await
                    {
                        Ok(()) => {
                            self.ctx.drivers.invalidate(&provider.id).await;
                            outcome.record_success();
                        }
                        Err(e) => outcome.record_failure(&provider.id, e),
                    }
                }
                Err(e) => {
                    log::warn!("Cannot rotate credentials of provider {}: {e}", provider.id);
                    outcome.record_failure(&provider.id, e);
                }
            }
        }

        log::info!(
            "Credential rotation: {} re-encrypted, {} failed",
            outcome.success_count,
            outcome.failure_count
        );
        Ok(outcome)
    }

    // ===== 内部方法 =====

    async fn ensure_name_free(
        &self,
        tenant_id: &str,
        name: &str,
        except_id: Option<&str>,
    ) -> CoreResult<()> {
        match self.ctx.repos.providers.find_by_name(tenant_id, name).await? {
            Some(existing) if Some(existing.id.as_str()) != except_id => Err(CoreError::Conflict(
                format!("provider name '{name}' is already used"),
            )),
            _ => Ok(()),
        }
    }

    /// Check one provider and persist the outcome. Never fails.
    async fn check_health(&self, provider: &Provider) -> HealthCheck {
        let deadline = self.ctx.request_timeout(provider);
        let result = match self.ctx.provider_driver(provider).await {
            Ok(driver) => match tokio::time::timeout(deadline, driver.test()).await {
                Ok(result) => result,
                Err(_) => failed_check(format!("no response within {}s", deadline.as_secs())),
            },
            Err(e) => failed_check(e.to_string()),
        };

        let update = HealthUpdate {
            status: if result.success {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            checked_at: result.tested_at,
            latency_ms: Some(result.latency_ms),
            error: result.error_message.clone(),
        };
        if let Err(e) = self.ctx.repos.providers.update_health(&provider.id, &update).await {
            log::error!("Failed to persist health of provider {}: {e}", provider.id);
        }
        if !result.success {
            log::warn!(
                "Provider {} ({}) unhealthy: {}",
                provider.name,
                provider.provider_type,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        result
    }

    async fn import_one(
        &self,
        remote_name: &str,
        provider: &Provider,
        actor: &Actor,
    ) -> CoreResult<ImportOutcome> {
        let name = normalize_zone_name(remote_name)?;
        let zones = &self.ctx.repos.zones;

        if let Some(existing) = zones.find_by_name(&actor.tenant_id, &name).await? {
            if existing.provider_id.as_deref() == Some(provider.id.as_str()) {
                return Ok(ImportOutcome::Unchanged(name));
            }
            let mut zone = existing.clone();
            zone.provider_id = Some(provider.id.clone());
            zone.updated_by.clone_from(&actor.id);
            zone.updated_at = Utc::now();
            let audit = ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Import)
                .before(&existing)
                .after(&zone)
                .describe(format!("relinked to provider {}", provider.name));
            zones.update(&zone, Some(&audit)).await?;
            return Ok(ImportOutcome::Relinked(name));
        }

        let now = Utc::now();
        let zone = Zone {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            name: name.clone(),
            status: ZoneStatus::Active,
            registrar_type: None,
            provider_id: Some(provider.id.clone()),
            expires_at: None,
            auto_renew: false,
            group_id: None,
            remark: None,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };
        let audit = ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Import)
            .after(&zone)
            .describe(format!("imported from provider {}", provider.name));
        zones.insert(&zone, Some(&audit)).await?;
        Ok(ImportOutcome::Created(name))
    }
}

enum ImportOutcome {
    Created(String),
    Relinked(String),
    Unchanged(String),
}

fn failed_check(message: String) -> HealthCheck {
    HealthCheck {
        success: false,
        latency_ms: 0,
        error_message: Some(message),
        tested_at: Utc::now(),
    }
}
