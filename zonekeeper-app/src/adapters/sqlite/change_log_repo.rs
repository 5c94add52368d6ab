//! `ChangeLogRepository` implementation for `SqliteStore`, plus the
//! savepoint-scoped audit write used by every mutating repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::ChangeLogRepository;
use zonekeeper_core::types::{ChangeLogEntry, ChangeLogQuery};

use super::entity::change_log;
use super::{db_err, fmt_ts, page_window, parse_enum, parse_ts, SqliteStore};

fn parse_snapshot(raw: Option<String>, field: &str) -> CoreResult<Option<serde_json::Value>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| CoreError::SerializationError(format!("Invalid {field}: {e}")))
}

impl change_log::Model {
    fn into_entry(self) -> CoreResult<ChangeLogEntry> {
        Ok(ChangeLogEntry {
            before: parse_snapshot(self.before, "before")?,
            after: parse_snapshot(self.after, "after")?,
            action: parse_enum(&self.action, "action")?,
            status: parse_enum(&self.status, "status")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            id: self.id,
            tenant_id: self.tenant_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            description: self.description,
            actor_id: self.actor_id,
            client_ip: self.client_ip,
        })
    }
}

fn entry_to_active_model(entry: &ChangeLogEntry) -> change_log::ActiveModel {
    change_log::ActiveModel {
        id: Set(entry.id.clone()),
        tenant_id: Set(entry.tenant_id.clone()),
        resource_type: Set(entry.resource_type.clone()),
        resource_id: Set(entry.resource_id.clone()),
        action: Set(entry.action.as_str().to_string()),
        before: Set(entry.before.as_ref().map(ToString::to_string)),
        after: Set(entry.after.as_ref().map(ToString::to_string)),
        status: Set(entry.status.as_str().to_string()),
        description: Set(entry.description.clone()),
        actor_id: Set(entry.actor_id.clone()),
        client_ip: Set(entry.client_ip.clone()),
        created_at: Set(fmt_ts(entry.created_at)),
    }
}

/// Write `audit` inside a savepoint of `txn`. Failures are logged and swallowed.
pub(crate) async fn write_audit(txn: &DatabaseTransaction, audit: Option<&ChangeLogEntry>) {
    let Some(entry) = audit else {
        return;
    };

    let savepoint = match txn.begin().await {
        Ok(sp) => sp,
        Err(e) => {
            log::warn!("审计日志写入跳过 ({} {}): {e}", entry.resource_type, entry.resource_id);
            return;
        }
    };

    match change_log::Entity::insert(entry_to_active_model(entry))
        .exec(&savepoint)
        .await
    {
        Ok(_) => {
            if let Err(e) = savepoint.commit().await {
                log::warn!("Failed to release audit savepoint: {e}");
            }
        }
        Err(e) => {
            log::warn!(
                "Failed to write audit entry for {} {}: {e}",
                entry.resource_type,
                entry.resource_id
            );
            if let Err(e) = savepoint.rollback().await {
                log::warn!("Failed to roll back audit savepoint: {e}");
            }
        }
    }
}

#[async_trait]
impl ChangeLogRepository for SqliteStore {
    async fn append(&self, entry: &ChangeLogEntry) -> CoreResult<()> {
        change_log::Entity::insert(entry_to_active_model(entry))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to append change log"))?;
        Ok(())
    }

    async fn list(&self, query: &ChangeLogQuery) -> CoreResult<(Vec<ChangeLogEntry>, u64)> {
        let mut select =
            change_log::Entity::find().filter(change_log::Column::TenantId.eq(&query.tenant_id));
        if let Some(t) = &query.resource_type {
            select = select.filter(change_log::Column::ResourceType.eq(t));
        }
        if let Some(id) = &query.resource_id {
            select = select.filter(change_log::Column::ResourceId.eq(id));
        }
        if let Some(action) = query.action {
            select = select.filter(change_log::Column::Action.eq(action.as_str()));
        }

        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count change logs"))?;
        let (offset, limit) = page_window(query.page);
        let rows = select
            .order_by_desc(change_log::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query change logs"))?;

        let entries = rows
            .into_iter()
            .map(change_log::Model::into_entry)
            .collect::<CoreResult<Vec<_>>>()?;
        Ok((entries, total))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let result = change_log::Entity::delete_many()
            .filter(change_log::Column::CreatedAt.lt(fmt_ts(cutoff)))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to purge change logs"))?;
        Ok(result.rows_affected)
    }
}
