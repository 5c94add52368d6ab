//! `RecordRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::RecordRepository;
use zonekeeper_core::types::{ChangeLogEntry, DnsRecordType, Record, RecordQuery, SyncStatus};

use super::change_log_repo::write_audit;
use super::entity::record;
use super::{
    commit, db_err, fmt_opt_ts, fmt_ts, narrow, page_window, parse_enum, parse_opt_ts, parse_ts,
    write_err, SqliteStore,
};

fn narrow_opt(value: Option<i32>, field: &str) -> CoreResult<Option<u16>> {
    value.map(|v| narrow(v, field)).transpose()
}

impl record::Model {
    fn into_record(self) -> CoreResult<Record> {
        Ok(Record {
            record_type: parse_enum(&self.record_type, "record_type")?,
            ttl: narrow(self.ttl, "ttl")?,
            priority: narrow_opt(self.priority, "priority")?,
            weight: narrow_opt(self.weight, "weight")?,
            port: narrow_opt(self.port, "port")?,
            sync_status: parse_enum(&self.sync_status, "sync_status")?,
            last_sync_at: parse_opt_ts(self.last_sync_at, "last_sync_at")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            tenant_id: self.tenant_id,
            zone_id: self.zone_id,
            provider_id: self.provider_id,
            name: self.name,
            value: self.value,
            cloud_record_id: self.cloud_record_id,
            remark: self.remark,
            created_by: self.created_by,
            updated_by: self.updated_by,
        })
    }
}

fn record_to_active_model(record: &Record) -> record::ActiveModel {
    record::ActiveModel {
        id: Set(record.id.clone()),
        tenant_id: Set(record.tenant_id.clone()),
        zone_id: Set(record.zone_id.clone()),
        provider_id: Set(record.provider_id.clone()),
        name: Set(record.name.clone()),
        record_type: Set(record.record_type.as_str().to_string()),
        value: Set(record.value.clone()),
        ttl: Set(i64::from(record.ttl)),
        priority: Set(record.priority.map(i32::from)),
        weight: Set(record.weight.map(i32::from)),
        port: Set(record.port.map(i32::from)),
        sync_status: Set(record.sync_status.as_str().to_string()),
        cloud_record_id: Set(record.cloud_record_id.clone()),
        last_sync_at: Set(fmt_opt_ts(record.last_sync_at)),
        remark: Set(record.remark.clone()),
        created_by: Set(record.created_by.clone()),
        updated_by: Set(record.updated_by.clone()),
        created_at: Set(fmt_ts(record.created_at)),
        updated_at: Set(fmt_ts(record.updated_at)),
    }
}

fn into_records(rows: Vec<record::Model>) -> CoreResult<Vec<Record>> {
    rows.into_iter().map(record::Model::into_record).collect()
}

fn duplicate(record: &Record) -> impl FnOnce() -> String + '_ {
    move || {
        format!(
            "record {} {} already exists in zone {}",
            record.name, record.record_type, record.zone_id
        )
    }
}

#[async_trait]
impl RecordRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Record>> {
        let row = record::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query record"))?;

        row.map(record::Model::into_record).transpose()
    }

    async fn find_by_key(
        &self,
        zone_id: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CoreResult<Option<Record>> {
        let row = record::Entity::find()
            .filter(record::Column::ZoneId.eq(zone_id))
            .filter(record::Column::Name.eq(name))
            .filter(record::Column::RecordType.eq(record_type.as_str()))
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query record"))?;

        row.map(record::Model::into_record).transpose()
    }

    async fn list_by_zone(&self, zone_id: &str) -> CoreResult<Vec<Record>> {
        let rows = record::Entity::find()
            .filter(record::Column::ZoneId.eq(zone_id))
            .order_by_asc(record::Column::Name)
            .order_by_asc(record::Column::RecordType)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query records"))?;
        into_records(rows)
    }

    async fn list(&self, query: &RecordQuery) -> CoreResult<(Vec<Record>, u64)> {
        let mut select =
            record::Entity::find().filter(record::Column::TenantId.eq(&query.tenant_id));
        if let Some(zone_id) = &query.zone_id {
            select = select.filter(record::Column::ZoneId.eq(zone_id));
        }
        if let Some(keyword) = &query.keyword {
            select = select.filter(
                Condition::any()
                    .add(record::Column::Name.contains(keyword))
                    .add(record::Column::Value.contains(keyword)),
            );
        }
        if let Some(record_type) = query.record_type {
            select = select.filter(record::Column::RecordType.eq(record_type.as_str()));
        }
        if let Some(status) = query.sync_status {
            select = select.filter(record::Column::SyncStatus.eq(status.as_str()));
        }

        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count records"))?;
        let (offset, limit) = page_window(query.page);
        let rows = select
            .order_by_asc(record::Column::Name)
            .order_by_asc(record::Column::RecordType)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query records"))?;

        Ok((into_records(rows)?, total))
    }

    async fn count_by_zone(&self, zone_id: &str) -> CoreResult<u64> {
        record::Entity::find()
            .filter(record::Column::ZoneId.eq(zone_id))
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count records"))
    }

    async fn count_by_provider(&self, provider_id: &str) -> CoreResult<u64> {
        record::Entity::find()
            .filter(record::Column::ProviderId.eq(provider_id))
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count records"))
    }

    async fn insert(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        record::Entity::insert(record_to_active_model(record))
            .exec(&txn)
            .await
            .map_err(write_err("Failed to insert record", duplicate(record)))?;
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn update(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        // cloud id 与同步时间只由 mark_synced 写
        let model = record::ActiveModel {
            cloud_record_id: NotSet,
            last_sync_at: NotSet,
            ..record_to_active_model(record)
        };
        let txn = self.begin().await?;
        let result = record::Entity::update_many()
            .set(model)
            .filter(record::Column::Id.eq(&record.id))
            .exec(&txn)
            .await
            .map_err(write_err("Failed to update record", duplicate(record)))?;
        if result.rows_affected == 0 {
            return Err(CoreError::RecordNotFound(record.id.clone()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        let result = record::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete record"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::RecordNotFound(id.to_string()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn mark_synced(
        &self,
        id: &str,
        cloud_record_id: Option<&str>,
        status: SyncStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let cloud_id = match cloud_record_id {
            Some(cid) => Set(Some(cid.to_string())),
            None => NotSet,
        };
        record::Entity::update_many()
            .set(record::ActiveModel {
                sync_status: Set(status.as_str().to_string()),
                cloud_record_id: cloud_id,
                last_sync_at: Set(Some(fmt_ts(at))),
                ..Default::default()
            })
            .filter(record::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to update sync status"))?;
        Ok(())
    }
}
