//! `ProviderRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
};

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::ProviderRepository;
use zonekeeper_core::types::{ChangeLogEntry, HealthUpdate, Provider, ProviderStatus};

use super::change_log_repo::write_audit;
use super::entity::provider;
use super::{
    commit, db_err, fmt_opt_ts, fmt_ts, narrow, parse_enum, parse_opt_ts, parse_ts, SqliteStore,
};

impl provider::Model {
    fn into_provider(self) -> CoreResult<Provider> {
        Ok(Provider {
            provider_type: parse_enum(&self.provider_type, "provider_type")?,
            rate_limit: narrow(self.rate_limit, "rate_limit")?,
            concurrency: narrow(self.concurrency, "concurrency")?,
            timeout_secs: narrow(self.timeout_secs, "timeout_secs")?,
            status: parse_enum(&self.status, "provider status")?,
            health_status: parse_enum(&self.health_status, "health_status")?,
            last_checked_at: parse_opt_ts(self.last_checked_at, "last_checked_at")?,
            last_latency_ms: self
                .last_latency_ms
                .map(|v| narrow(v, "last_latency_ms"))
                .transpose()?,
            deleted_at: parse_opt_ts(self.deleted_at, "deleted_at")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            tenant_id: self.tenant_id,
            name: self.name,
            credentials_enc: self.credentials_enc,
            is_default: self.is_default,
            last_error: self.last_error,
            remark: self.remark,
        })
    }
}

fn provider_to_active_model(provider: &Provider) -> CoreResult<provider::ActiveModel> {
    Ok(provider::ActiveModel {
        id: Set(provider.id.clone()),
        tenant_id: Set(provider.tenant_id.clone()),
        name: Set(provider.name.clone()),
        provider_type: Set(provider.provider_type.as_str().to_string()),
        credentials_enc: Set(provider.credentials_enc.clone()),
        rate_limit: Set(i64::from(provider.rate_limit)),
        concurrency: Set(i64::from(provider.concurrency)),
        timeout_secs: Set(narrow(provider.timeout_secs, "timeout_secs")?),
        is_default: Set(provider.is_default),
        status: Set(provider.status.as_str().to_string()),
        health_status: Set(provider.health_status.as_str().to_string()),
        last_checked_at: Set(fmt_opt_ts(provider.last_checked_at)),
        last_latency_ms: Set(provider
            .last_latency_ms
            .map(|v| narrow(v, "last_latency_ms"))
            .transpose()?),
        last_error: Set(provider.last_error.clone()),
        remark: Set(provider.remark.clone()),
        deleted_at: Set(fmt_opt_ts(provider.deleted_at)),
        created_at: Set(fmt_ts(provider.created_at)),
        updated_at: Set(fmt_ts(provider.updated_at)),
    })
}

fn into_providers(rows: Vec<provider::Model>) -> CoreResult<Vec<Provider>> {
    rows.into_iter().map(provider::Model::into_provider).collect()
}

/// 每个租户最多一个默认 provider
async fn clear_other_defaults(txn: &DatabaseTransaction, provider: &Provider) -> CoreResult<()> {
    if !provider.is_default {
        return Ok(());
    }
    provider::Entity::update_many()
        .set(provider::ActiveModel {
            is_default: Set(false),
            ..Default::default()
        })
        .filter(provider::Column::TenantId.eq(&provider.tenant_id))
        .filter(provider::Column::Id.ne(&provider.id))
        .filter(provider::Column::IsDefault.eq(true))
        .exec(txn)
        .await
        .map_err(db_err("Failed to clear default provider"))?;
    Ok(())
}

impl SqliteStore {
    async fn update_provider_columns(&self, id: &str, model: provider::ActiveModel) -> CoreResult<()> {
        let result = provider::Entity::update_many()
            .set(model)
            .filter(provider::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to update provider"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::ProviderNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Provider>> {
        let row = provider::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query provider"))?;

        row.map(provider::Model::into_provider).transpose()
    }

    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Provider>> {
        let row = provider::Entity::find()
            .filter(provider::Column::TenantId.eq(tenant_id))
            .filter(provider::Column::Name.eq(name))
            .filter(provider::Column::DeletedAt.is_null())
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query provider"))?;

        row.map(provider::Model::into_provider).transpose()
    }

    async fn list(&self, tenant_id: Option<&str>) -> CoreResult<Vec<Provider>> {
        let mut select = provider::Entity::find().filter(provider::Column::DeletedAt.is_null());
        if let Some(tenant_id) = tenant_id {
            select = select.filter(provider::Column::TenantId.eq(tenant_id));
        }
        let rows = select
            .order_by_asc(provider::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query providers"))?;
        into_providers(rows)
    }

    async fn list_active(&self) -> CoreResult<Vec<Provider>> {
        let rows = provider::Entity::find()
            .filter(provider::Column::DeletedAt.is_null())
            .filter(provider::Column::Status.eq(ProviderStatus::Active.as_str()))
            .order_by_asc(provider::Column::Name)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query providers"))?;
        into_providers(rows)
    }

    async fn insert(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let model = provider_to_active_model(provider)?;
        let txn = self.begin().await?;
        clear_other_defaults(&txn, provider).await?;
        provider::Entity::insert(model)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to insert provider"))?;
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn update(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let model = provider_to_active_model(provider)?;
        let txn = self.begin().await?;
        clear_other_defaults(&txn, provider).await?;
        let result = provider::Entity::update_many()
            .set(model)
            .filter(provider::Column::Id.eq(&provider.id))
            .exec(&txn)
            .await
            .map_err(db_err("Failed to update provider"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::ProviderNotFound(provider.id.clone()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn update_credentials(&self, id: &str, credentials_enc: &str) -> CoreResult<()> {
        self.update_provider_columns(
            id,
            provider::ActiveModel {
                credentials_enc: Set(credentials_enc.to_string()),
                updated_at: Set(fmt_ts(Utc::now())),
                ..Default::default()
            },
        )
        .await
    }

    async fn update_health(&self, id: &str, health: &HealthUpdate) -> CoreResult<()> {
        let latency = match health.latency_ms {
            Some(ms) => Set(Some(narrow(ms, "last_latency_ms")?)),
            // 探测失败时保留上一次成功的延迟
            None => NotSet,
        };
        self.update_provider_columns(
            id,
            provider::ActiveModel {
                health_status: Set(health.status.as_str().to_string()),
                last_checked_at: Set(Some(fmt_ts(health.checked_at))),
                last_latency_ms: latency,
                last_error: Set(health.error.clone()),
                ..Default::default()
            },
        )
        .await
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()> {
        let txn = self.begin().await?;
        let result = provider::Entity::update_many()
            .set(provider::ActiveModel {
                deleted_at: Set(Some(fmt_ts(deleted_at))),
                is_default: Set(false),
                updated_at: Set(fmt_ts(deleted_at)),
                ..Default::default()
            })
            .filter(provider::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete provider"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::ProviderNotFound(id.to_string()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }
}
