//! DNS 记录管理服务
//!
//! 本地先写（`sync_status = pending`），再经 worker pool 异步推送到服务商。

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use chrono::Utc;
use zonekeeper_provider::{with_deadline, DnsRecordType, ProviderError, RecordData};

use crate::error::{CoreError, CoreResult};
use crate::services::{log_core_error, ServiceContext};
use crate::types::{
    resource, Actor, ChangeAction, ChangeLogEntry, CreateRecordRequest, Page, Record,
    RecordQuery, SyncStatus, UpdateRecordRequest, Zone,
};
use crate::utils::normalize_record_name;

pub const MIN_TTL: u32 = 60;
pub const MAX_TTL: u32 = 86_400;

/// DNS 记录管理服务
pub struct RecordService {
    ctx: Arc<ServiceContext>,
}

impl RecordService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// 创建记录并排队推送
    pub async fn create_record(
        &self,
        request: CreateRecordRequest,
        actor: &Actor,
    ) -> CoreResult<Record> {
        let zone = self.ctx.get_zone(&request.zone_id, &actor.tenant_id).await?;
        let name = normalize_record_name(&request.name)?;
        let value = request.value.trim().to_string();
        validate_fields(
            request.record_type,
            &value,
            request.ttl,
            request.priority,
            request.weight,
            request.port,
        )?;

        if self
            .ctx
            .repos
            .records
            .find_by_key(&zone.id, &name, request.record_type)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "record {name} {} already exists in zone {}",
                request.record_type, zone.name
            )));
        }

        let now = Utc::now();
        let record = Record {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            zone_id: zone.id.clone(),
            provider_id: zone.provider_id.clone(),
            name,
            record_type: request.record_type,
            value,
            ttl: request.ttl,
            priority: request.priority,
            weight: request.weight,
            port: request.port,
            sync_status: SyncStatus::Pending,
            cloud_record_id: None,
            last_sync_at: None,
            remark: request.remark,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let audit = ChangeLogEntry::new(actor, resource::RECORD, &record.id, ChangeAction::Create)
            .after(&record);
        self.ctx.repos.records.insert(&record, Some(&audit)).await?;
        self.enqueue_push(&zone, &record);
        Ok(record)
    }

    pub async fn get_record(&self, record_id: &str, tenant_id: &str) -> CoreResult<Record> {
        self.ctx
            .repos
            .records
            .find_by_id(record_id)
            .await?
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::RecordNotFound(record_id.to_string()))
    }

    pub async fn list_records(&self, query: &RecordQuery) -> CoreResult<Page<Record>> {
        let (items, total) = self.ctx.repos.records.list(query).await?;
        Ok(Page::new(items, total, query.page))
    }

    /// 更新记录。`(name, type)` 不可变，改名请删除后重建。
    pub async fn update_record(
        &self,
        record_id: &str,
        request: UpdateRecordRequest,
        actor: &Actor,
    ) -> CoreResult<Record> {
        let before = self.get_record(record_id, &actor.tenant_id).await?;
        let zone = self.ctx.get_zone(&before.zone_id, &actor.tenant_id).await?;

        let mut record = before.clone();
        if let Some(value) = request.value {
            record.value = value.trim().to_string();
        }
        if let Some(ttl) = request.ttl {
            record.ttl = ttl;
        }
        if request.priority.is_some() {
            record.priority = request.priority;
        }
        if request.weight.is_some() {
            record.weight = request.weight;
        }
        if request.port.is_some() {
            record.port = request.port;
        }
        if request.remark.is_some() {
            record.remark = request.remark;
        }
        validate_fields(
            record.record_type,
            &record.value,
            record.ttl,
            record.priority,
            record.weight,
            record.port,
        )?;

        record.provider_id.clone_from(&zone.provider_id);
        record.sync_status = SyncStatus::Pending;
        record.updated_by.clone_from(&actor.id);
        record.updated_at = Utc::now();

        let audit = ChangeLogEntry::new(actor, resource::RECORD, record_id, ChangeAction::Update)
            .before(&before)
            .after(&record);
        self.ctx.repos.records.update(&record, Some(&audit)).await?;
        self.enqueue_push(&zone, &record);
        Ok(record)
    }

    /// 删除本地记录，并排队删除服务商侧记录
    pub async fn delete_record(&self, record_id: &str, actor: &Actor) -> CoreResult<()> {
        let record = self.get_record(record_id, &actor.tenant_id).await?;
        let zone = self.ctx.get_zone(&record.zone_id, &actor.tenant_id).await?;

        let audit = ChangeLogEntry::new(actor, resource::RECORD, record_id, ChangeAction::Delete)
            .before(&record);
        self.ctx.repos.records.delete(record_id, Some(&audit)).await?;
        self.enqueue_remote_delete(&zone, record);
        Ok(())
    }

    // ===== 异步推送 =====

    fn enqueue_push(&self, zone: &Zone, record: &Record) {
        let Some(provider_id) = zone.provider_id.clone() else {
            log::debug!("Zone {} has no provider, record {} stays pending", zone.name, record.id);
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        let zone_name = zone.name.clone();
        let record_id = record.id.clone();

        let task_name = format!("push record {record_id}");
        let submitted = self.ctx.workers.submit(task_name, async move {
            // 同一条记录的创建/更新排队执行，后一次推送能看到前一次写回的 cloud id
            let _push = ctx.record_pushes.lock(&record_id).await;
            if let Err(e) = push_record(&ctx, &provider_id, &zone_name, &record_id).await {
                log_core_error(&format!("Failed to push record {record_id}"), &e);
                if let Err(e) = ctx
                    .repos
                    .records
                    .mark_synced(&record_id, None, SyncStatus::Error, Utc::now())
                    .await
                {
                    log::error!("Failed to flag record {record_id} as error: {e}");
                }
            }
        });
        if let Err(e) = submitted {
            // 记录保持 pending，下一次同步会补推
            log::warn!("Cannot queue push of record {}: {e}", record.id);
        }
    }

    fn enqueue_remote_delete(&self, zone: &Zone, record: Record) {
        let Some(provider_id) = zone.provider_id.clone() else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        let zone_name = zone.name.clone();
        let record_id = record.id.clone();
        let queued_id = record.id.clone();

        let submitted = self
            .ctx
            .workers
            .submit(format!("delete record {record_id}"), async move {
                let _push = ctx.record_pushes.lock(&record_id).await;
                let result = async {
                    let provider = ctx.get_provider(&provider_id, None).await?;
                    let driver = ctx.provider_driver(&provider).await?;
                    let key = record.delete_key();
                    with_deadline(
                        driver.id(),
                        ctx.request_timeout(&provider),
                        driver.delete_record(&zone_name, &key),
                    )
                    .await
                    .map_err(CoreError::from)
                }
                .await;
                match result {
                    Ok(()) => log::info!(
                        "Record {} {} removed from provider",
                        record.name,
                        record.record_type
                    ),
                    Err(e) => {
                        log_core_error(&format!("Failed to delete record {record_id} remotely"), &e);
                    }
                }
            });
        if let Err(e) = submitted {
            log::warn!("Cannot queue remote delete of record {queued_id}: {e}");
        }
    }
}

/// Push the current local state of one record.
///
/// Updates in place when the cloud id is known, otherwise creates. A cloud id
/// that the provider no longer knows falls back to a create.
async fn push_record(
    ctx: &ServiceContext,
    provider_id: &str,
    zone_name: &str,
    record_id: &str,
) -> CoreResult<()> {
    let Some(record) = ctx.repos.records.find_by_id(record_id).await? else {
        // 推送前已被删除
        return Ok(());
    };
    let provider = ctx.get_provider(provider_id, None).await?;
    let driver = ctx.provider_driver(&provider).await?;
    let deadline = ctx.request_timeout(&provider);
    let spec = record.spec()?;

    let pushed = match record.cloud_record_id.as_deref() {
        Some(cloud_id) => {
            match with_deadline(driver.id(), deadline, driver.update_record(zone_name, cloud_id, &spec))
                .await
            {
                Err(ProviderError::RecordNotFound { .. }) => {
                    with_deadline(driver.id(), deadline, driver.create_record(zone_name, &spec))
                        .await
                }
                other => other,
            }
        }
        None => with_deadline(driver.id(), deadline, driver.create_record(zone_name, &spec)).await,
    };

    let remote = match pushed {
        Ok(remote) => remote,
        Err(e) => return Err(ctx.handle_provider_error(provider_id, e).await),
    };
    ctx.repos
        .records
        .mark_synced(record_id, Some(&remote.id), SyncStatus::Synced, Utc::now())
        .await?;
    log::debug!("Record {} {} synced as {}", record.name, record.record_type, remote.id);
    Ok(())
}

/// Field checks shared by create and update.
pub(crate) fn validate_fields(
    record_type: DnsRecordType,
    value: &str,
    ttl: u32,
    priority: Option<u16>,
    weight: Option<u16>,
    port: Option<u16>,
) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::ValidationError("record value is required".into()));
    }
    if !(MIN_TTL..=MAX_TTL).contains(&ttl) {
        return Err(CoreError::ValidationError(format!(
            "TTL must be between {MIN_TTL} and {MAX_TTL}, got {ttl}"
        )));
    }
    if priority.is_some() && !record_type.has_priority() {
        return Err(CoreError::ValidationError(format!(
            "priority is only allowed for MX and SRV records, not {record_type}"
        )));
    }
    if (weight.is_some() || port.is_some()) && record_type != DnsRecordType::Srv {
        return Err(CoreError::ValidationError(format!(
            "weight and port are only allowed for SRV records, not {record_type}"
        )));
    }
    match record_type {
        DnsRecordType::A if value.parse::<Ipv4Addr>().is_err() => {
            return Err(CoreError::ValidationError(format!("invalid IPv4 address: {value}")));
        }
        DnsRecordType::Aaaa if value.parse::<Ipv6Addr>().is_err() => {
            return Err(CoreError::ValidationError(format!("invalid IPv6 address: {value}")));
        }
        _ => {}
    }

    RecordData::from_parts(record_type, value, priority, weight, port)
        .map(|_| ())
        .map_err(|e| CoreError::ValidationError(e.to_string()))
}
