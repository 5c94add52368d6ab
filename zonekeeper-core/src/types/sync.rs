//! 同步（对账）相关类型

use serde::{Deserialize, Serialize};

use zonekeeper_provider::{DnsRecord, DnsRecordType};

use super::common::Actor;
use super::record::Record;

/// Narrows the compared key space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default)]
    pub dry_run: bool,
    /// Empty means every type.
    #[serde(default)]
    pub record_types: Vec<DnsRecordType>,
    /// Relative names left out of the diff.
    #[serde(default)]
    pub exclude_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub zone_id: String,
    /// Falls back to the zone's linked provider.
    pub provider_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    pub actor: Actor,
}

/// A key present on both sides with differing content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    /// Desired state
    pub local: Record,
    /// Observed provider state
    pub remote: DnsRecord,
}

/// Three-way diff between the local desired state and the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiff {
    /// Local-only keys, to be created at the provider.
    pub to_add: Vec<Record>,
    pub to_update: Vec<RecordUpdate>,
    /// Remote-only keys, to be removed from the provider.
    pub to_delete: Vec<DnsRecord>,
    /// In-sync keys whose local row lacks the provider id or is not marked synced.
    #[serde(default)]
    pub to_relink: Vec<(Record, String)>,
}

impl SyncDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItemError {
    /// `add` / `update` / `delete`
    pub operation: String,
    pub name: String,
    pub record_type: DnsRecordType,
    pub error: String,
}

/// Counts from applying a diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub errors: Vec<SyncItemError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub zone_name: String,
    pub provider: String,
    pub total_local: usize,
    pub total_remote: usize,
    pub to_add: usize,
    pub to_update: usize,
    pub to_delete: usize,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub error_count: usize,
    pub errors: Vec<SyncItemError>,
    pub dry_run: bool,
    pub duration_ms: u64,
}
