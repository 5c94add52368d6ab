//! 服务商账号持久化抽象 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{ChangeLogEntry, HealthUpdate, Provider};

/// Provider repository
///
/// Soft-deleted rows are invisible to every read method.
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Provider>>;

    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Provider>>;

    /// Providers of one tenant, or of every tenant when `tenant_id` is `None`.
    async fn list(&self, tenant_id: Option<&str>) -> CoreResult<Vec<Provider>>;

    /// `status = active` across every tenant.
    async fn list_active(&self) -> CoreResult<Vec<Provider>>;

    /// Insert a provider. When `is_default` is set, the tenant's other
    /// providers lose the flag in the same transaction.
    async fn insert(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    /// Same default-flag rule as [`insert`](Self::insert).
    async fn update(&self, provider: &Provider, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    /// Replace the credential blob only.
    async fn update_credentials(&self, id: &str, credentials_enc: &str) -> CoreResult<()>;

    /// Persist the result of a health check.
    async fn update_health(&self, id: &str, health: &HealthUpdate) -> CoreResult<()>;

    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()>;
}
