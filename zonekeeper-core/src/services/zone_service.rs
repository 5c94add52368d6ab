//! 域名管理服务

use std::sync::Arc;

use chrono::Utc;

use crate::error::{CoreError, CoreResult};
use crate::services::ServiceContext;
use crate::types::{
    resource, Actor, ChangeAction, ChangeLogEntry, CreateZoneRequest, Page, UpdateZoneRequest,
    Zone, ZoneQuery, ZoneStatus,
};
use crate::utils::normalize_zone_name;

/// 域名管理服务
pub struct ZoneService {
    ctx: Arc<ServiceContext>,
}

impl ZoneService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// 注册域名
    pub async fn create_zone(&self, request: CreateZoneRequest, actor: &Actor) -> CoreResult<Zone> {
        let name = normalize_zone_name(&request.name)?;
        if self
            .ctx
            .repos
            .zones
            .find_by_name(&actor.tenant_id, &name)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!("zone '{name}' already exists")));
        }
        if let Some(provider_id) = &request.provider_id {
            self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;
        }

        let now = Utc::now();
        let zone = Zone {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            name,
            status: ZoneStatus::Active,
            registrar_type: request.registrar_type,
            provider_id: request.provider_id,
            expires_at: request.expires_at,
            auto_renew: request.auto_renew,
            group_id: request.group_id,
            remark: request.remark,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let audit =
            ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Create).after(&zone);
        self.ctx.repos.zones.insert(&zone, Some(&audit)).await?;
        log::info!("Zone {} created by {}", zone.name, actor.id);
        Ok(zone)
    }

    pub async fn get_zone(&self, zone_id: &str, tenant_id: &str) -> CoreResult<Zone> {
        self.ctx.get_zone(zone_id, tenant_id).await
    }

    /// 列出域名（分页 + 搜索）
    pub async fn list_zones(&self, query: &ZoneQuery) -> CoreResult<Page<Zone>> {
        let (items, total) = self.ctx.repos.zones.list(query).await?;
        Ok(Page::new(items, total, query.page))
    }

    pub async fn update_zone(
        &self,
        zone_id: &str,
        request: UpdateZoneRequest,
        actor: &Actor,
    ) -> CoreResult<Zone> {
        let before = self.ctx.get_zone(zone_id, &actor.tenant_id).await?;
        if let Some(provider_id) = &request.provider_id {
            self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;
        }

        let mut zone = before.clone();
        if let Some(status) = request.status {
            zone.status = status;
        }
        if request.registrar_type.is_some() {
            zone.registrar_type = request.registrar_type;
        }
        if request.provider_id.is_some() {
            zone.provider_id = request.provider_id;
        }
        if request.expires_at.is_some() {
            zone.expires_at = request.expires_at;
        }
        if let Some(auto_renew) = request.auto_renew {
            zone.auto_renew = auto_renew;
        }
        if request.group_id.is_some() {
            zone.group_id = request.group_id;
        }
        if request.remark.is_some() {
            zone.remark = request.remark;
        }
        zone.updated_by.clone_from(&actor.id);
        zone.updated_at = Utc::now();

        let audit = ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Update)
            .before(&before)
            .after(&zone);
        self.ctx.repos.zones.update(&zone, Some(&audit)).await?;
        Ok(zone)
    }

    /// 删除域名。仍有记录时拒绝删除。
    pub async fn delete_zone(&self, zone_id: &str, actor: &Actor) -> CoreResult<()> {
        let zone = self.ctx.get_zone(zone_id, &actor.tenant_id).await?;
        let records = self.ctx.repos.records.count_by_zone(zone_id).await?;
        if records > 0 {
            return Err(CoreError::Conflict(format!(
                "zone '{}' still has {records} records",
                zone.name
            )));
        }

        let audit = ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Delete)
            .before(&zone);
        self.ctx.repos.zones.delete(zone_id, Some(&audit)).await?;
        log::info!("Zone {} deleted by {}", zone.name, actor.id);
        Ok(())
    }
}
