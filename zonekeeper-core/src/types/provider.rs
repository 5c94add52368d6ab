//! DNS 服务商账号相关类型

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use zonekeeper_provider::ProviderType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

string_enum!(ProviderStatus { Active => "active", Inactive => "inactive" });
string_enum!(HealthStatus { Unknown => "unknown", Healthy => "healthy", Unhealthy => "unhealthy" });

/// A configured DNS vendor account.
///
/// `credentials_enc` holds the vault blob and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub provider_type: ProviderType,
    #[serde(skip_serializing, default)]
    pub credentials_enc: String,
    /// Requests per second
    pub rate_limit: u32,
    pub concurrency: u32,
    pub timeout_secs: u64,
    pub is_default: bool,
    pub status: ProviderStatus,
    pub health_status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    pub fn is_active(&self) -> bool {
        self.status == ProviderStatus::Active && self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderRequest {
    pub name: String,
    pub provider_type: ProviderType,
    /// Plain credential map, validated against the driver metadata.
    pub credentials: HashMap<String, String>,
    pub rate_limit: Option<u32>,
    pub concurrency: Option<u32>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub is_default: bool,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    /// Re-encrypted when present.
    pub credentials: Option<HashMap<String, String>>,
    pub rate_limit: Option<u32>,
    pub concurrency: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub is_default: Option<bool>,
    pub status: Option<ProviderStatus>,
    pub remark: Option<String>,
}

/// Result of one health check, persisted on the provider row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthUpdate {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Outcome of probing every provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub failures: Vec<super::common::BatchFailure>,
}
