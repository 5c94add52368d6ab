//! DNS 记录（本地期望状态）相关类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zonekeeper_provider::{DnsRecordType, RecordData, RecordKey, RecordSpec};

use super::common::PageRequest;
use crate::error::{CoreError, CoreResult};

/// Divergence between the local row and provider truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Error,
}

string_enum!(SyncStatus { Pending => "pending", Synced => "synced", Error => "error" });

/// Desired record. `(zone_id, name, record_type)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub tenant_id: String,
    pub zone_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Relative name, `@` for apex
    pub name: String,
    pub record_type: DnsRecordType,
    pub value: String,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub sync_status: SyncStatus,
    /// Provider-side id; `None` until the first successful push.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn data(&self) -> CoreResult<RecordData> {
        RecordData::from_parts(
            self.record_type,
            &self.value,
            self.priority,
            self.weight,
            self.port,
        )
        .map_err(|e| CoreError::ValidationError(format!("record {}: {e}", self.name)))
    }

    /// Driver payload for create/update calls.
    pub fn spec(&self) -> CoreResult<RecordSpec> {
        Ok(RecordSpec {
            name: self.name.clone(),
            ttl: self.ttl,
            data: self.data()?,
        })
    }

    /// Delete target: the cloud id when known, else `(name, type)`.
    pub fn delete_key(&self) -> RecordKey {
        RecordKey::from_cloud_id(self.cloud_record_id.as_deref(), &self.name, self.record_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub zone_id: String,
    pub name: String,
    pub record_type: DnsRecordType,
    pub value: String,
    pub ttl: u32,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    pub remark: Option<String>,
}

/// `None` leaves the field unchanged. The `(name, type)` key cannot change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    pub value: Option<String>,
    pub ttl: Option<u32>,
    pub priority: Option<u16>,
    pub weight: Option<u16>,
    pub port: Option<u16>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub tenant_id: String,
    pub zone_id: Option<String>,
    pub keyword: Option<String>,
    pub record_type: Option<DnsRecordType>,
    pub sync_status: Option<SyncStatus>,
    #[serde(default)]
    pub page: PageRequest,
}

impl RecordQuery {
    pub fn matches(&self, record: &Record) -> bool {
        record.tenant_id == self.tenant_id
            && self.zone_id.as_deref().is_none_or(|z| record.zone_id == z)
            && self
                .keyword
                .as_deref()
                .is_none_or(|k| record.name.contains(k) || record.value.contains(k))
            && self.record_type.is_none_or(|t| record.record_type == t)
            && self.sync_status.is_none_or(|s| record.sync_status == s)
    }
}
