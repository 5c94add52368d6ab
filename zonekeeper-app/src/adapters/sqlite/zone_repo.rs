//! `ZoneRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::ZoneRepository;
use zonekeeper_core::types::{ChangeLogEntry, Zone, ZoneQuery};

use super::change_log_repo::write_audit;
use super::entity::zone;
use super::{
    commit, db_err, fmt_opt_ts, fmt_ts, page_window, parse_enum, parse_opt_ts, parse_ts,
    write_err, SqliteStore,
};

impl zone::Model {
    /// Convert a `SeaORM` row model into a domain `Zone`.
    fn into_zone(self) -> CoreResult<Zone> {
        Ok(Zone {
            status: parse_enum(&self.status, "zone status")?,
            expires_at: parse_opt_ts(self.expires_at, "expires_at")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            registrar_type: self.registrar_type,
            provider_id: self.provider_id,
            auto_renew: self.auto_renew,
            group_id: self.group_id,
            remark: self.remark,
            created_by: self.created_by,
            updated_by: self.updated_by,
        })
    }
}

fn zone_to_active_model(zone: &Zone) -> zone::ActiveModel {
    zone::ActiveModel {
        id: Set(zone.id.clone()),
        tenant_id: Set(zone.tenant_id.clone()),
        name: Set(zone.name.clone()),
        status: Set(zone.status.as_str().to_string()),
        registrar_type: Set(zone.registrar_type.clone()),
        provider_id: Set(zone.provider_id.clone()),
        expires_at: Set(fmt_opt_ts(zone.expires_at)),
        auto_renew: Set(zone.auto_renew),
        group_id: Set(zone.group_id.clone()),
        remark: Set(zone.remark.clone()),
        created_by: Set(zone.created_by.clone()),
        updated_by: Set(zone.updated_by.clone()),
        created_at: Set(fmt_ts(zone.created_at)),
        updated_at: Set(fmt_ts(zone.updated_at)),
    }
}

fn into_zones(rows: Vec<zone::Model>) -> CoreResult<Vec<Zone>> {
    rows.into_iter().map(zone::Model::into_zone).collect()
}

#[async_trait]
impl ZoneRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Zone>> {
        let row = zone::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query zone"))?;

        row.map(zone::Model::into_zone).transpose()
    }

    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Zone>> {
        let row = zone::Entity::find()
            .filter(zone::Column::TenantId.eq(tenant_id))
            .filter(zone::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query zone"))?;

        row.map(zone::Model::into_zone).transpose()
    }

    async fn list(&self, query: &ZoneQuery) -> CoreResult<(Vec<Zone>, u64)> {
        let mut select = zone::Entity::find().filter(zone::Column::TenantId.eq(&query.tenant_id));
        if let Some(keyword) = &query.keyword {
            select = select.filter(zone::Column::Name.contains(keyword.to_ascii_lowercase()));
        }
        if let Some(provider_id) = &query.provider_id {
            select = select.filter(zone::Column::ProviderId.eq(provider_id));
        }
        if let Some(status) = query.status {
            select = select.filter(zone::Column::Status.eq(status.as_str()));
        }

        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count zones"))?;
        let (offset, limit) = page_window(query.page);
        let rows = select
            .order_by_asc(zone::Column::Name)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query zones"))?;

        Ok((into_zones(rows)?, total))
    }

    async fn list_by_provider(&self, provider_id: &str) -> CoreResult<Vec<Zone>> {
        let rows = zone::Entity::find()
            .filter(zone::Column::ProviderId.eq(provider_id))
            .order_by_asc(zone::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query zones"))?;
        into_zones(rows)
    }

    async fn list_expiring(&self, before: DateTime<Utc>) -> CoreResult<Vec<Zone>> {
        let rows = zone::Entity::find()
            .filter(zone::Column::ExpiresAt.is_not_null())
            .filter(zone::Column::ExpiresAt.lte(fmt_ts(before)))
            .order_by_asc(zone::Column::ExpiresAt)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query expiring zones"))?;
        into_zones(rows)
    }

    async fn insert(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        zone::Entity::insert(zone_to_active_model(zone))
            .exec(&txn)
            .await
            .map_err(write_err("Failed to insert zone", || {
                format!("zone '{}' already exists", zone.name)
            }))?;
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn update(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        let result = zone::Entity::update_many()
            .set(zone_to_active_model(zone))
            .filter(zone::Column::Id.eq(&zone.id))
            .exec(&txn)
            .await
            .map_err(write_err("Failed to update zone", || {
                format!("zone '{}' already exists", zone.name)
            }))?;
        if result.rows_affected == 0 {
            return Err(CoreError::ZoneNotFound(zone.id.clone()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        let result = zone::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete zone"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::ZoneNotFound(id.to_string()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }
}
