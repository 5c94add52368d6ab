//! DNSPod DnsProvider trait 实现

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{ProviderError, Result};
use crate::providers::common::{
    ensure_writable, normalize_domain_name, parse_record_type, record_data_from_vendor,
    record_data_to_vendor,
};
use crate::traits::{DnsProvider, ErrorContext, ProviderErrorMapper};
use crate::types::{
    DnsRecord, DnsRecordType, FieldType, PaginatedResponse, PaginationParams,
    ProviderCredentialField, ProviderLimits, ProviderMetadata, ProviderType, ProviderZone,
    RecordQueryParams, RecordSpec, ZoneStatus,
};

use super::{
    CreateRecordResponse, DEFAULT_RECORD_LINE, DnspodProvider, DnspodRecord, ZoneListResponse,
    EmptyResponse, MAX_PAGE_SIZE, RecordListResponse,
};

/// 记录列表为空时 DescribeRecordList 返回的错误码
const NO_DATA_OF_RECORD: &str = "ResourceNotFound.NoDataOfRecord";

/// DNSPod 不提供 PTR 记录
const UNWRITABLE_TYPES: &[DnsRecordType] = &[DnsRecordType::Ptr];

#[derive(Serialize)]
struct DescribeDomainListRequest {
    #[serde(rename = "Offset")]
    offset: u32,
    #[serde(rename = "Limit")]
    limit: u32,
}

#[derive(Serialize)]
struct DescribeRecordListRequest {
    #[serde(rename = "Domain")]
    domain: String,
    #[serde(rename = "Offset")]
    offset: u32,
    #[serde(rename = "Limit")]
    limit: u32,
    /// 精确匹配主机记录
    #[serde(rename = "Subdomain", skip_serializing_if = "Option::is_none")]
    subdomain: Option<String>,
    #[serde(rename = "RecordType", skip_serializing_if = "Option::is_none")]
    record_type: Option<&'static str>,
}

/// Body shared by `CreateRecord` and `ModifyRecord` (with `RecordId`).
#[derive(Serialize)]
struct RecordWriteRequest {
    #[serde(rename = "Domain")]
    domain: String,
    #[serde(rename = "RecordId", skip_serializing_if = "Option::is_none")]
    record_id: Option<u64>,
    #[serde(rename = "SubDomain")]
    sub_domain: String,
    #[serde(rename = "RecordType")]
    record_type: &'static str,
    #[serde(rename = "RecordLine")]
    record_line: &'static str,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "MX", skip_serializing_if = "Option::is_none")]
    mx: Option<u16>,
}

impl RecordWriteRequest {
    fn new(zone: &str, record_id: Option<u64>, spec: &RecordSpec) -> Self {
        let (value, mx) = record_data_to_vendor(&spec.data);
        Self {
            domain: normalize_domain_name(zone),
            record_id,
            sub_domain: spec.name.clone(),
            record_type: spec.data.record_type().as_str(),
            record_line: DEFAULT_RECORD_LINE,
            value,
            ttl: spec.ttl,
            mx,
        }
    }
}

impl DnspodProvider {
    pub(crate) fn convert_zone_status(status: &str, dns_status: &str) -> ZoneStatus {
        match (status, dns_status) {
            ("PAUSE" | "pause", _) => ZoneStatus::Paused,
            ("SPAM" | "spam", _) | (_, "DNSERROR") => ZoneStatus::Error,
            ("ENABLE" | "enable", _) => ZoneStatus::Active,
            _ => ZoneStatus::Unknown,
        }
    }

    pub(crate) fn to_dns_record(&self, r: DnspodRecord) -> Result<DnsRecord> {
        let record_type = parse_record_type(&r.record_type, self.provider_name())?;
        Ok(DnsRecord {
            data: record_data_from_vendor(self.provider_name(), record_type, &r.value, r.mx)?,
            id: r.id.to_string(),
            name: r.name,
            ttl: r.ttl,
        })
    }

    /// DNSPod record ids are numeric; anything else cannot exist.
    fn numeric_record_id(&self, record_id: &str) -> Result<u64> {
        record_id
            .parse()
            .map_err(|_| ProviderError::RecordNotFound {
                provider: self.provider_name().to_string(),
                record_id: record_id.to_string(),
                raw_message: None,
            })
    }
}

#[async_trait]
impl DnsProvider for DnspodProvider {
    fn id(&self) -> &'static str {
        "dnspod"
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            id: ProviderType::Dnspod,
            name: "腾讯云 DNSPod".to_string(),
            description: "Tencent Cloud DNSPod, API 3.0 SecretId/SecretKey".to_string(),
            required_fields: vec![
                ProviderCredentialField {
                    key: "secretId".to_string(),
                    label: "SecretId".to_string(),
                    field_type: FieldType::Text,
                    help_text: None,
                },
                ProviderCredentialField {
                    key: "secretKey".to_string(),
                    label: "SecretKey".to_string(),
                    field_type: FieldType::Password,
                    help_text: None,
                },
            ],
            limits: ProviderLimits {
                max_page_size_zones: MAX_PAGE_SIZE,
                max_page_size_records: MAX_PAGE_SIZE,
            },
        }
    }

    async fn validate_credentials(&self) -> Result<bool> {
        let req = DescribeDomainListRequest {
            offset: 0,
            limit: 1,
        };
        match self
            .request::<ZoneListResponse, _>("DescribeDomainList", &req, ErrorContext::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_auth_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_zones_page(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<ProviderZone>> {
        let params = params.validated(MAX_PAGE_SIZE);
        let req = DescribeDomainListRequest {
            offset: (params.page - 1) * params.page_size,
            limit: params.page_size,
        };
        let response: ZoneListResponse = self
            .request("DescribeDomainList", &req, ErrorContext::default())
            .await?;

        let total = response.total();
        let zones = response
            .zones
            .into_iter()
            .map(|d| ProviderZone {
                id: d.id.to_string(),
                status: Self::convert_zone_status(&d.status, &d.dns_status),
                name: d.name,
                record_count: d.record_count,
            })
            .collect();

        Ok(PaginatedResponse::new(
            zones,
            params.page,
            params.page_size,
            total,
        ))
    }

    async fn list_records_page(
        &self,
        zone: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>> {
        let page = params.pagination.validated(MAX_PAGE_SIZE);
        let req = DescribeRecordListRequest {
            domain: normalize_domain_name(zone),
            offset: (page.page - 1) * page.page_size,
            limit: page.page_size,
            subdomain: params.name.clone().filter(|n| !n.is_empty()),
            record_type: params.record_type.map(|t| t.as_str()),
        };

        let response: RecordListResponse = match self
            .request("DescribeRecordList", &req, ErrorContext::zone(zone))
            .await
        {
            Ok(r) => r,
            Err(ProviderError::Unknown { raw_code, .. })
                if raw_code.as_deref() == Some(NO_DATA_OF_RECORD) =>
            {
                return Ok(PaginatedResponse::new(Vec::new(), page.page, page.page_size, 0));
            }
            Err(e) => return Err(e),
        };

        let total = response.total();
        let mut records = Vec::new();
        for raw in response.records {
            match self.to_dns_record(raw) {
                Ok(record) => records.push(record),
                // 显性/隐性 URL 等类型不在支持范围内
                Err(ProviderError::UnsupportedRecordType { record_type, .. }) => {
                    log::debug!("[dnspod] skipping {record_type} record in {zone}");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PaginatedResponse::new(records, page.page, page.page_size, total))
    }

    async fn create_record(&self, zone: &str, spec: &RecordSpec) -> Result<DnsRecord> {
        ensure_writable(self.id(), spec, UNWRITABLE_TYPES)?;
        let response: CreateRecordResponse = self
            .request(
                "CreateRecord",
                &RecordWriteRequest::new(zone, None, spec),
                ErrorContext::record_name(zone, &spec.name),
            )
            .await?;

        Ok(DnsRecord {
            id: response.record_id.to_string(),
            name: spec.name.clone(),
            ttl: spec.ttl,
            data: spec.data.clone(),
        })
    }

    async fn update_record(
        &self,
        zone: &str,
        record_id: &str,
        spec: &RecordSpec,
    ) -> Result<DnsRecord> {
        ensure_writable(self.id(), spec, UNWRITABLE_TYPES)?;
        let id = self.numeric_record_id(record_id)?;
        self.request::<EmptyResponse, _>(
            "ModifyRecord",
            &RecordWriteRequest::new(zone, Some(id), spec),
            ErrorContext::record(zone, record_id),
        )
        .await?;

        Ok(DnsRecord {
            id: record_id.to_string(),
            name: spec.name.clone(),
            ttl: spec.ttl,
            data: spec.data.clone(),
        })
    }

    async fn delete_record_by_id(&self, zone: &str, record_id: &str) -> Result<()> {
        #[derive(Serialize)]
        struct DeleteRecordRequest {
            #[serde(rename = "Domain")]
            domain: String,
            #[serde(rename = "RecordId")]
            record_id: u64,
        }

        let req = DeleteRecordRequest {
            domain: normalize_domain_name(zone),
            record_id: self.numeric_record_id(record_id)?,
        };
        self.request::<EmptyResponse, _>("DeleteRecord", &req, ErrorContext::record(zone, record_id))
            .await
            .map(|_| ())
    }
}
