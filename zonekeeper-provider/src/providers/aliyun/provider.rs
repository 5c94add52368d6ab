//! 阿里云 DnsProvider trait 实现

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

use super::types::AliyunRecord;
use super::{
    AddDomainRecordResponse, AliyunProvider, DescribeDomainRecordsResponse,
    DescribeDomainsResponse, EmptyResponse, MAX_PAGE_SIZE,
};

/// 公网解析没有 PTR
const UNWRITABLE_TYPES: &[DnsRecordType] = &[DnsRecordType::Ptr];

#[derive(Serialize)]
struct DescribeDomainsRequest {
    #[serde(rename = "PageNumber")]
    page_number: u32,
    #[serde(rename = "PageSize")]
    page_size: u32,
}

#[derive(Serialize)]
struct DescribeDomainRecordsRequest {
    #[serde(rename = "DomainName")]
    domain_name: String,
    #[serde(rename = "PageNumber")]
    page_number: u32,
    #[serde(rename = "PageSize")]
    page_size: u32,
    /// 主机记录关键字（模糊匹配）
    #[serde(rename = "RRKeyWord", skip_serializing_if = "Option::is_none")]
    rr_keyword: Option<String>,
    #[serde(rename = "TypeKeyWord", skip_serializing_if = "Option::is_none")]
    type_keyword: Option<&'static str>,
}

/// Body shared by `AddDomainRecord` (with `DomainName`) and `UpdateDomainRecord` (with `RecordId`).
#[derive(Serialize)]
struct RecordWriteRequest {
    #[serde(rename = "DomainName", skip_serializing_if = "Option::is_none")]
    domain_name: Option<String>,
    #[serde(rename = "RecordId", skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
    #[serde(rename = "RR")]
    rr: String,
    #[serde(rename = "Type")]
    record_type: &'static str,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "Priority", skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
}

impl RecordWriteRequest {
    fn from_spec(spec: &RecordSpec) -> Self {
        let (value, priority) = record_data_to_vendor(&spec.data);
        Self {
            domain_name: None,
            record_id: None,
            rr: spec.name.clone(),
            record_type: spec.data.record_type().as_str(),
            value,
            ttl: spec.ttl,
            priority,
        }
    }
}

impl AliyunProvider {
    pub(crate) fn convert_zone_status(status: Option<&str>) -> ZoneStatus {
        match status {
            Some("ENABLE" | "enable") | None => ZoneStatus::Active,
            Some("PAUSE" | "pause") => ZoneStatus::Paused,
            Some("SPAM" | "spam") => ZoneStatus::Error,
            _ => ZoneStatus::Unknown,
        }
    }

    pub(crate) fn to_dns_record(&self, r: AliyunRecord) -> Result<DnsRecord> {
        let record_type = parse_record_type(&r.record_type, self.provider_name())?;
        Ok(DnsRecord {
            data: record_data_from_vendor(self.provider_name(), record_type, &r.value, r.priority)?,
            id: r.record_id,
            name: r.rr,
            ttl: r.ttl,
        })
    }
}

#[async_trait]
impl DnsProvider for AliyunProvider {
    fn id(&self) -> &'static str {
        "aliyun"
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            id: ProviderType::Aliyun,
            name: "阿里云 DNS".to_string(),
            description: "Alibaba Cloud DNS, AccessKey authentication".to_string(),
            required_fields: vec![
                ProviderCredentialField {
                    key: "accessKeyId".to_string(),
                    label: "AccessKey ID".to_string(),
                    field_type: FieldType::Text,
                    help_text: None,
                },
                ProviderCredentialField {
                    key: "accessKeySecret".to_string(),
                    label: "AccessKey Secret".to_string(),
                    field_type: FieldType::Password,
                    help_text: Some("RAM user with AliyunDNSFullAccess".to_string()),
                },
            ],
            limits: ProviderLimits {
                max_page_size_zones: MAX_PAGE_SIZE,
                max_page_size_records: MAX_PAGE_SIZE,
            },
        }
    }

    async fn validate_credentials(&self) -> Result<bool> {
        let req = DescribeDomainsRequest {
            page_number: 1,
            page_size: 1,
        };
        match self
            .request::<DescribeDomainsResponse, _>("DescribeDomains", &req, ErrorContext::default())
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
        let req = DescribeDomainsRequest {
            page_number: params.page,
            page_size: params.page_size,
        };
        let response: DescribeDomainsResponse = self
            .request("DescribeDomains", &req, ErrorContext::default())
            .await?;

        let zones = response
            .domains
            .and_then(|d| d.domain)
            .unwrap_or_default()
            .into_iter()
            .map(|d| ProviderZone {
                id: d.domain_id.unwrap_or_else(|| d.domain_name.clone()),
                status: Self::convert_zone_status(d.domain_status.as_deref()),
                name: d.domain_name,
                record_count: d.record_count,
            })
            .collect();

        Ok(PaginatedResponse::new(
            zones,
            params.page,
            params.page_size,
            response.total_count.unwrap_or(0),
        ))
    }

    async fn list_records_page(
        &self,
        zone: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>> {
        let page = params.pagination.validated(MAX_PAGE_SIZE);
        let req = DescribeDomainRecordsRequest {
            domain_name: normalize_domain_name(zone),
            page_number: page.page,
            page_size: page.page_size,
            rr_keyword: params.name.clone().filter(|n| !n.is_empty()),
            type_keyword: params.record_type.map(|t| t.as_str()),
        };

        let response: DescribeDomainRecordsResponse = self
            .request("DescribeDomainRecords", &req, ErrorContext::zone(zone))
            .await?;

        let mut records = Vec::new();
        for raw in response
            .domain_records
            .and_then(|r| r.record)
            .unwrap_or_default()
        {
            match self.to_dns_record(raw) {
                Ok(record) => records.push(record),
                // 显性/隐性 URL 转发等类型不在支持范围内
                Err(ProviderError::UnsupportedRecordType { record_type, .. }) => {
                    log::debug!("[aliyun] skipping {record_type} record in {zone}");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PaginatedResponse::new(
            records,
            page.page,
            page.page_size,
            response.total_count.unwrap_or(0),
        ))
    }

    async fn create_record(&self, zone: &str, spec: &RecordSpec) -> Result<DnsRecord> {
        ensure_writable(self.id(), spec, UNWRITABLE_TYPES)?;
        let req = RecordWriteRequest {
            domain_name: Some(normalize_domain_name(zone)),
            ..RecordWriteRequest::from_spec(spec)
        };
        let response: AddDomainRecordResponse = self
            .request(
                "AddDomainRecord",
                &req,
                ErrorContext::record_name(zone, &spec.name),
            )
            .await?;

        Ok(DnsRecord {
            id: response.record_id,
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
        let req = RecordWriteRequest {
            record_id: Some(record_id.to_string()),
            ..RecordWriteRequest::from_spec(spec)
        };
        match self
            .request::<EmptyResponse, _>(
                "UpdateDomainRecord",
                &req,
                ErrorContext::record(zone, record_id),
            )
            .await
        {
            // 内容未变化时阿里云返回 DomainRecordDuplicate，视为成功
            Ok(_) | Err(ProviderError::RecordExists { .. }) => {}
            Err(e) => return Err(e),
        }

        Ok(DnsRecord {
            id: record_id.to_string(),
            name: spec.name.clone(),
            ttl: spec.ttl,
            data: spec.data.clone(),
        })
    }

    async fn delete_record_by_id(&self, zone: &str, record_id: &str) -> Result<()> {
        #[derive(Serialize)]
        struct DeleteDomainRecordRequest<'a> {
            #[serde(rename = "RecordId")]
            record_id: &'a str,
        }

        self.request::<EmptyResponse, _>(
            "DeleteDomainRecord",
            &DeleteDomainRecordRequest { record_id },
            ErrorContext::record(zone, record_id),
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::aliyun::serialize_to_query_string;
    use crate::types::RecordData;

    #[test]
    fn record_conversion() {
        let p = AliyunProvider::new("id".into(), "secret".into()).unwrap();
        let raw: AliyunRecord = serde_json::from_value(serde_json::json!({
            "RecordId": "9000", "RR": "@", "Type": "MX",
            "Value": "mx.example.com", "TTL": 600, "Priority": 5
        }))
        .unwrap();
        let record = p.to_dns_record(raw).unwrap();
        assert_eq!(record.name, "@");
        assert_eq!(record.data.priority(), Some(5));

        let forward: AliyunRecord = serde_json::from_value(serde_json::json!({
            "RecordId": "9001", "RR": "go", "Type": "REDIRECT_URL",
            "Value": "https://example.com", "TTL": 600
        }))
        .unwrap();
        assert!(matches!(
            p.to_dns_record(forward),
            Err(ProviderError::UnsupportedRecordType { .. })
        ));
    }

    #[tokio::test]
    async fn ptr_create_is_not_implemented() {
        let p = AliyunProvider::new("id".into(), "secret".into()).unwrap();
        let spec = RecordSpec {
            name: "10".into(),
            ttl: 600,
            data: RecordData::PTR {
                target: "host.example.com".into(),
            },
        };
        let err = p.create_record("example.com", &spec).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::NotImplemented { ref operation, .. } if operation == "write PTR record"
        ));
    }

    #[test]
    fn add_request_query_string() {
        let spec = RecordSpec {
            name: "_acme-challenge".into(),
            ttl: 600,
            data: RecordData::TXT {
                text: "abc".into(),
            },
        };
        let req = RecordWriteRequest {
            domain_name: Some("example.com".into()),
            ..RecordWriteRequest::from_spec(&spec)
        };
        assert_eq!(
            serialize_to_query_string(&req).unwrap(),
            "DomainName=example.com&RR=_acme-challenge&TTL=600&Type=TXT&Value=abc"
        );
    }

    #[test]
    fn zone_status_defaults_to_active() {
        assert_eq!(AliyunProvider::convert_zone_status(None), ZoneStatus::Active);
        assert_eq!(
            AliyunProvider::convert_zone_status(Some("PAUSE")),
            ZoneStatus::Paused
        );
    }
}
