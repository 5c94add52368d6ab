//! Cloudflare DnsProvider trait 实现

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::error::{ProviderError, Result};
use crate::providers::common::{
    full_name_to_relative, normalize_domain_name, parse_record_type, record_data_from_vendor,
    relative_to_full_name,
};
use crate::traits::{DnsProvider, ErrorContext, ProviderErrorMapper};
use crate::types::{
    DnsRecord, FieldType, PaginatedResponse, PaginationParams, ProviderCredentialField,
    ProviderLimits, ProviderMetadata, ProviderType, ProviderZone, RecordQueryParams, RecordSpec,
};

use super::types::RecordBody;
use super::{CfRecord, CfZone, CloudflareProvider, MAX_PAGE_SIZE_RECORDS, MAX_PAGE_SIZE_ZONES};

impl CloudflareProvider {
    /// Zone name → Cloudflare zone id (cached).
    pub(crate) async fn zone_id(&self, zone: &str) -> Result<String> {
        let zone = normalize_domain_name(zone).to_ascii_lowercase();
        if let Ok(cache) = self.zone_ids.read()
            && let Some(id) = cache.get(&zone)
        {
            return Ok(id.clone());
        }

        let resp = self
            .get::<Vec<CfZone>>(
                &format!("/zones?name={}", urlencoding::encode(&zone)),
                ErrorContext::zone(&zone),
            )
            .await?;
        let id = resp
            .result
            .unwrap_or_default()
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(&zone))
            .map(|z| z.id)
            .ok_or_else(|| ProviderError::ZoneNotFound {
                provider: self.provider_name().to_string(),
                zone: zone.clone(),
                raw_message: None,
            })?;

        if let Ok(mut cache) = self.zone_ids.write() {
            cache.insert(zone, id.clone());
        }
        Ok(id)
    }

    pub(crate) fn to_dns_record(&self, r: CfRecord, zone: &str) -> Result<DnsRecord> {
        let record_type = parse_record_type(&r.record_type, self.provider_name())?;
        let data = match r.structured() {
            Some(data) => data,
            None => {
                record_data_from_vendor(self.provider_name(), record_type, &r.content, r.priority)?
            }
        };

        Ok(DnsRecord {
            id: r.id,
            name: full_name_to_relative(&r.name, zone),
            ttl: r.ttl,
            data,
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn id(&self) -> &'static str {
        "cloudflare"
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            id: ProviderType::Cloudflare,
            name: "Cloudflare".to_string(),
            description: "Cloudflare DNS, API token authentication".to_string(),
            required_fields: vec![ProviderCredentialField {
                key: "apiToken".to_string(),
                label: "API Token".to_string(),
                field_type: FieldType::Password,
                help_text: Some("Token with Zone:Read and DNS:Edit permissions".to_string()),
            }],
            limits: ProviderLimits {
                max_page_size_zones: MAX_PAGE_SIZE_ZONES,
                max_page_size_records: MAX_PAGE_SIZE_RECORDS,
            },
        }
    }

    async fn validate_credentials(&self) -> Result<bool> {
        #[derive(Deserialize)]
        struct VerifyResult {
            status: String,
        }

        match self
            .get::<VerifyResult>("/user/tokens/verify", ErrorContext::default())
            .await
        {
            Ok(resp) => Ok(resp.result.is_some_and(|r| r.status == "active")),
            Err(e) if e.is_auth_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_zones_page(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<ProviderZone>> {
        let params = params.validated(MAX_PAGE_SIZE_ZONES);
        let resp = self
            .get::<Vec<CfZone>>(
                &format!("/zones?page={}&per_page={}", params.page, params.page_size),
                ErrorContext::default(),
            )
            .await?;

        let total = resp.total();
        let zones: Vec<ProviderZone> = resp
            .result
            .unwrap_or_default()
            .into_iter()
            .map(ProviderZone::from)
            .collect();

        // 顺便填充 zone id 缓存
        if let Ok(mut cache) = self.zone_ids.write() {
            for z in &zones {
                cache.insert(z.name.to_ascii_lowercase(), z.id.clone());
            }
        }

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
        let zone_id = self.zone_id(zone).await?;
        let page = params.pagination.validated(MAX_PAGE_SIZE_RECORDS);

        let mut url = format!(
            "/zones/{zone_id}/dns_records?page={}&per_page={}",
            page.page, page.page_size
        );
        if let Some(name) = params.name.as_deref().filter(|n| !n.is_empty()) {
            let full = relative_to_full_name(name, zone);
            url.push_str(&format!("&name={}", urlencoding::encode(&full)));
        }
        if let Some(t) = params.record_type {
            url.push_str(&format!("&type={}", t.as_str()));
        }

        let resp = self
            .get::<Vec<CfRecord>>(&url, ErrorContext::zone(zone))
            .await?;
        let total = resp.total();

        let mut records = Vec::new();
        for raw in resp.result.unwrap_or_default() {
            match self.to_dns_record(raw, zone) {
                Ok(record) => records.push(record),
                // 不支持的类型（LOC、HTTPS 等）直接跳过
                Err(ProviderError::UnsupportedRecordType { record_type, .. }) => {
                    log::debug!("[cloudflare] skipping {record_type} record in {zone}");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PaginatedResponse::new(
            records,
            page.page,
            page.page_size,
            total,
        ))
    }

    async fn create_record(&self, zone: &str, spec: &RecordSpec) -> Result<DnsRecord> {
        let zone_id = self.zone_id(zone).await?;
        let body = RecordBody::new(zone, spec);
        let created: CfRecord = self
            .send_for_result(
                Method::POST,
                &format!("/zones/{zone_id}/dns_records"),
                &body,
                ErrorContext::record_name(zone, &spec.name),
            )
            .await?;
        self.to_dns_record(created, zone)
    }

    async fn update_record(
        &self,
        zone: &str,
        record_id: &str,
        spec: &RecordSpec,
    ) -> Result<DnsRecord> {
        let zone_id = self.zone_id(zone).await?;
        let body = RecordBody::new(zone, spec);
        let updated: CfRecord = self
            .send_for_result(
                Method::PUT,
                &format!("/zones/{zone_id}/dns_records/{record_id}"),
                &body,
                ErrorContext::record(zone, record_id),
            )
            .await?;
        self.to_dns_record(updated, zone)
    }

    async fn delete_record_by_id(&self, zone: &str, record_id: &str) -> Result<()> {
        let zone_id = self.zone_id(zone).await?;
        self.delete(
            &format!("/zones/{zone_id}/dns_records/{record_id}"),
            ErrorContext::record(zone, record_id),
        )
        .await
    }
}
