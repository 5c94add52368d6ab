//! 域名（Zone）相关类型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Active,
    Inactive,
    Expired,
}

string_enum!(ZoneStatus { Active => "active", Inactive => "inactive", Expired => "expired" });

/// A domain owned by a tenant. `name` is unique per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub status: ZoneStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar_type: Option<String>,
    /// Provider hosting the zone's records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Registration expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateZoneRequest {
    pub name: String,
    pub registrar_type: Option<String>,
    pub provider_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_renew: bool,
    pub group_id: Option<String>,
    pub remark: Option<String>,
}

/// `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateZoneRequest {
    pub status: Option<ZoneStatus>,
    pub registrar_type: Option<String>,
    pub provider_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renew: Option<bool>,
    pub group_id: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneQuery {
    pub tenant_id: String,
    /// Substring match on the name.
    pub keyword: Option<String>,
    pub provider_id: Option<String>,
    pub status: Option<ZoneStatus>,
    #[serde(default)]
    pub page: PageRequest,
}

impl ZoneQuery {
    pub fn matches(&self, zone: &Zone) -> bool {
        zone.tenant_id == self.tenant_id
            && self
                .keyword
                .as_deref()
                .is_none_or(|k| zone.name.contains(&k.to_ascii_lowercase()))
            && self
                .provider_id
                .as_deref()
                .is_none_or(|p| zone.provider_id.as_deref() == Some(p))
            && self.status.is_none_or(|s| zone.status == s)
    }
}

/// Outcome of importing a provider's zones into the local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneImportResult {
    pub created: Vec<String>,
    pub relinked: Vec<String>,
    pub unchanged: Vec<String>,
    pub failures: Vec<super::common::BatchFailure>,
}
