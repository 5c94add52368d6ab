//! DNS 记录持久化抽象 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use zonekeeper_provider::DnsRecordType;

use crate::error::CoreResult;
use crate::types::{ChangeLogEntry, Record, RecordQuery, SyncStatus};

/// Record repository
///
/// `(zone_id, name, record_type)` is unique; `insert` fails with `Conflict`
/// on a duplicate key.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Record>>;

    async fn find_by_key(
        &self,
        zone_id: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> CoreResult<Option<Record>>;

    /// Every record of a zone, ordered by name then type.
    async fn list_by_zone(&self, zone_id: &str) -> CoreResult<Vec<Record>>;

    async fn list(&self, query: &RecordQuery) -> CoreResult<(Vec<Record>, u64)>;

    async fn count_by_zone(&self, zone_id: &str) -> CoreResult<u64>;

    async fn count_by_provider(&self, provider_id: &str) -> CoreResult<u64>;

    async fn insert(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    /// Overwrite the editable fields. `cloud_record_id` and `last_sync_at` are left as stored.
    async fn update(&self, record: &Record, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    /// Record the outcome of a push. `cloud_record_id = None` keeps the stored id.
    ///
    /// The only writer of `cloud_record_id`.
    async fn mark_synced(
        &self,
        id: &str,
        cloud_record_id: Option<&str>,
        status: SyncStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<()>;
}
