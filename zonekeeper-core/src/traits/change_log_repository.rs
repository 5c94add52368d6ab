//! 审计日志持久化抽象 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{ChangeLogEntry, ChangeLogQuery};

/// Append-only change log
#[async_trait]
pub trait ChangeLogRepository: Send + Sync {
    /// Standalone append, for operations without a row mutation (sync runs).
    async fn append(&self, entry: &ChangeLogEntry) -> CoreResult<()>;

    /// Newest first
    async fn list(&self, query: &ChangeLogQuery) -> CoreResult<(Vec<ChangeLogEntry>, u64)>;

    /// Retention cleanup; returns the number of deleted rows.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<u64>;
}
