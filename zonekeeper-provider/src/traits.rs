use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::types::{
    ChallengeRecord, DnsRecord, DnsRecordType, PaginatedResponse, PaginationParams, HealthCheck,
    ProviderMetadata, ProviderZone, RecordData, RecordFilter, RecordKey, RecordQueryParams,
    RecordSpec, ZoneFilter,
};

/// Upper bound on pages walked by the default list methods.
const MAX_PAGES: u32 = 1000;

/// 原始 API 错误（内部使用）
#[derive(Debug, Clone)]
pub(crate) struct RawApiError {
    /// 错误码（各 Provider 格式不同）
    pub code: Option<String>,
    pub message: String,
}

impl RawApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Extra identifiers attached to a mapped error.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorContext {
    pub record_name: Option<String>,
    pub record_id: Option<String>,
    pub zone: Option<String>,
}

impl ErrorContext {
    pub fn zone(zone: &str) -> Self {
        Self {
            zone: Some(zone.to_string()),
            ..Self::default()
        }
    }

    pub fn record(zone: &str, record_id: &str) -> Self {
        Self {
            zone: Some(zone.to_string()),
            record_id: Some(record_id.to_string()),
            record_name: None,
        }
    }

    pub fn record_name(zone: &str, name: &str) -> Self {
        Self {
            zone: Some(zone.to_string()),
            record_name: Some(name.to_string()),
            record_id: None,
        }
    }
}

/// What a vendor error code means for a zone/record operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CodeClass {
    Credentials,
    Permission,
    RecordExists,
    RecordMissing,
    ZoneMissing,
    ZoneLocked,
    Quota,
    Throttled,
    Invalid(RecordField),
}

/// Field named by [`ProviderError::InvalidParameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordField {
    Name,
    Type,
    Value,
    Ttl,
    Priority,
    Line,
    Zone,
}

impl RecordField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Type => "type",
            Self::Value => "value",
            Self::Ttl => "ttl",
            Self::Priority => "priority",
            Self::Line => "line",
            Self::Zone => "zone",
        }
    }
}

/// 上下文缺失时的占位
const UNKNOWN_TARGET: &str = "<unknown>";

/// Provider 错误映射 Trait（内部使用）
/// 各 Provider 实现此 trait 将厂商错误码映射到 [`ProviderError`]
pub(crate) trait ProviderErrorMapper {
    fn provider_name(&self) -> &'static str;

    fn map_error(&self, raw: RawApiError, context: ErrorContext) -> ProviderError;

    fn parse_error(&self, detail: impl ToString) -> ProviderError {
        ProviderError::ParseError {
            provider: self.provider_name().to_string(),
            detail: detail.to_string(),
        }
    }

    fn unknown_error(&self, raw: RawApiError) -> ProviderError {
        ProviderError::Unknown {
            provider: self.provider_name().to_string(),
            raw_code: raw.code,
            raw_message: raw.message,
        }
    }

    /// Build the error for a classified code; `None` falls back to `Unknown`.
    fn classified(
        &self,
        class: Option<CodeClass>,
        raw: RawApiError,
        context: ErrorContext,
    ) -> ProviderError {
        let Some(class) = class else {
            return self.unknown_error(raw);
        };
        let provider = self.provider_name().to_string();
        let raw_message = Some(raw.message.clone());
        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN_TARGET.to_string());
        match class {
            CodeClass::Credentials => ProviderError::InvalidCredentials {
                provider,
                raw_message,
            },
            CodeClass::Permission => ProviderError::PermissionDenied {
                provider,
                raw_message,
            },
            CodeClass::RecordExists => ProviderError::RecordExists {
                provider,
                record_name: or_unknown(context.record_name),
                raw_message,
            },
            CodeClass::RecordMissing => ProviderError::RecordNotFound {
                provider,
                record_id: or_unknown(context.record_id),
                raw_message,
            },
            CodeClass::ZoneMissing => ProviderError::ZoneNotFound {
                provider,
                zone: or_unknown(context.zone),
                raw_message,
            },
            CodeClass::ZoneLocked => ProviderError::ZoneLocked {
                provider,
                zone: or_unknown(context.zone),
                raw_message,
            },
            CodeClass::Quota => ProviderError::QuotaExceeded {
                provider,
                raw_message,
            },
            CodeClass::Throttled => ProviderError::RateLimited {
                provider,
                retry_after: None,
                raw_message,
            },
            CodeClass::Invalid(field) => ProviderError::InvalidParameter {
                provider,
                param: field.as_str().to_string(),
                detail: raw.message,
            },
        }
    }
}

/// DNS vendor driver.
///
/// Zones are addressed by name everywhere; drivers that need a vendor zone id
/// resolve it internally. Record names are relative to the zone (`@` for apex).
///
/// Only the paged primitives and the single-record mutations are required. The
/// list, delete-by-key, TXT challenge and health-check operations have default
/// implementations built on them.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// 提供商标识符
    fn id(&self) -> &'static str;

    /// Static metadata, available without an instance.
    fn metadata() -> ProviderMetadata
    where
        Self: Sized;

    /// Lightweight call proving the credential works.
    async fn validate_credentials(&self) -> Result<bool>;

    async fn list_zones_page(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<ProviderZone>>;

    async fn list_records_page(
        &self,
        zone: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>>;

    /// Create a record; the returned record carries the provider-assigned id.
    async fn create_record(&self, zone: &str, spec: &RecordSpec) -> Result<DnsRecord>;

    async fn update_record(&self, zone: &str, record_id: &str, spec: &RecordSpec)
    -> Result<DnsRecord>;

    /// Delete by provider id. Drivers report a missing record as `RecordNotFound`.
    async fn delete_record_by_id(&self, zone: &str, record_id: &str) -> Result<()>;

    /// Every zone visible to the credential.
    async fn list_zones(&self, filter: &ZoneFilter) -> Result<Vec<ProviderZone>> {
        let mut params = PaginationParams::default();
        let mut zones = Vec::new();
        for _ in 0..MAX_PAGES {
            let page = self.list_zones_page(&params).await?;
            // 以服务端总数为准，驱动可能丢掉整页不支持的条目
            let has_more = page.has_more;
            zones.extend(page.items.into_iter().filter(|z| filter.matches(z)));
            if !has_more {
                break;
            }
            params = params.next();
        }
        Ok(zones)
    }

    /// Every record in `zone` matching `filter`.
    async fn list_records(&self, zone: &str, filter: &RecordFilter) -> Result<Vec<DnsRecord>> {
        let mut query = RecordQueryParams::from_filter(filter, PaginationParams::default());
        let mut records = Vec::new();
        for _ in 0..MAX_PAGES {
            let page = self.list_records_page(zone, &query).await?;
            let has_more = page.has_more;
            // 部分厂商的 name 过滤是模糊匹配，这里再精确过滤一次
            records.extend(page.items.into_iter().filter(|r| filter.matches(r)));
            if !has_more {
                break;
            }
            query.pagination = query.pagination.next();
        }
        Ok(records)
    }

    /// Delete by id or by `(name, type)`. A record that is already gone counts as deleted.
    async fn delete_record(&self, zone: &str, key: &RecordKey) -> Result<()> {
        let ids = match key {
            RecordKey::Id { id } => vec![id.clone()],
            RecordKey::NameType { name, record_type } => {
                let filter = RecordFilter {
                    name: Some(name.clone()),
                    record_type: Some(*record_type),
                };
                self.list_records(zone, &filter)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .collect()
            }
        };

        for id in ids {
            match self.delete_record_by_id(zone, &id).await {
                Ok(()) | Err(ProviderError::RecordNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Publish a DNS-01 TXT value. An identical record that already exists is reused.
    async fn create_txt_challenge(
        &self,
        zone: &str,
        record_name: &str,
        value: &str,
        ttl: u32,
    ) -> Result<ChallengeRecord> {
        let existing = self
            .list_records(zone, &txt_filter(record_name))
            .await?
            .into_iter()
            .find(|r| txt_value_eq(&r.data, value));

        let record_id = match existing {
            Some(record) => record.id,
            None => {
                let spec = RecordSpec {
                    name: record_name.to_string(),
                    ttl,
                    data: RecordData::TXT {
                        text: value.to_string(),
                    },
                };
                self.create_record(zone, &spec).await?.id
            }
        };

        Ok(ChallengeRecord {
            record_id,
            zone: zone.to_string(),
            name: record_name.to_string(),
            value: value.to_string(),
        })
    }

    /// Remove the TXT records at `record_name` holding `value`. Other values are left alone.
    async fn delete_txt_challenge(&self, zone: &str, record_name: &str, value: &str) -> Result<()> {
        let matching: Vec<DnsRecord> = self
            .list_records(zone, &txt_filter(record_name))
            .await?
            .into_iter()
            .filter(|r| txt_value_eq(&r.data, value))
            .collect();

        for record in matching {
            self.delete_record(zone, &RecordKey::Id { id: record.id })
                .await?;
        }
        Ok(())
    }

    /// Connectivity/auth check. Never fails; the outcome is in the result.
    async fn test(&self) -> HealthCheck {
        let started = Instant::now();
        let outcome = self.validate_credentials().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let error_message = match outcome {
            Ok(true) => None,
            Ok(false) => Some(format!("[{}] credentials rejected", self.id())),
            Err(e) => Some(e.to_string()),
        };
        HealthCheck {
            success: error_message.is_none(),
            latency_ms,
            error_message,
            tested_at: chrono::Utc::now(),
        }
    }
}

fn txt_filter(record_name: &str) -> RecordFilter {
    RecordFilter {
        name: Some(record_name.to_string()),
        record_type: Some(DnsRecordType::Txt),
    }
}

// 部分厂商返回的 TXT 值带引号
fn txt_value_eq(data: &RecordData, value: &str) -> bool {
    matches!(data, RecordData::TXT { text } if text.trim_matches('"') == value)
}

/// Run a driver call with a deadline, turning expiry into [`ProviderError::Timeout`].
pub async fn with_deadline<T, F>(provider: &str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            provider: provider.to_string(),
            detail: format!("no response within {}s", deadline.as_secs()),
        }),
    }
}
