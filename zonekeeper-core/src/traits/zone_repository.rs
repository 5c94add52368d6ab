//! 域名持久化抽象 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{ChangeLogEntry, Zone, ZoneQuery};

/// Zone repository
///
/// Mutations take an optional audit entry, written in the same transaction.
/// An audit write failure never rolls back the mutation.
#[async_trait]
pub trait ZoneRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Zone>>;

    /// Lookup by name within a tenant (names are unique per tenant).
    async fn find_by_name(&self, tenant_id: &str, name: &str) -> CoreResult<Option<Zone>>;

    /// Filtered page plus the total match count.
    async fn list(&self, query: &ZoneQuery) -> CoreResult<(Vec<Zone>, u64)>;

    /// Every zone linked to a provider, any tenant.
    async fn list_by_provider(&self, provider_id: &str) -> CoreResult<Vec<Zone>>;

    /// Active zones whose registration expires at or before `before`, any tenant.
    async fn list_expiring(&self, before: DateTime<Utc>) -> CoreResult<Vec<Zone>>;

    async fn insert(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    async fn update(&self, zone: &Zone, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;
}
