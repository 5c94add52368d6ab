//! Provider 公共工具函数

use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;

use crate::error::{ProviderError, Result};
use crate::types::{DnsRecordType, RecordData, RecordSpec};

type HmacSha256 = Hmac<Sha256>;

// ============ HTTP Client ============

/// 连接超时（秒）
const CONNECT_TIMEOUT_SECS: u64 = 10;
/// 单次请求总超时（秒）
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared client settings for every driver.
pub fn create_http_client(provider: &str) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| ProviderError::NetworkError {
            provider: provider.to_string(),
            detail: format!("failed to build HTTP client: {e}"),
        })
}

// ============ 记录类型转换 ============

/// Parse a vendor type string. Types outside our set surface as `UnsupportedRecordType`.
pub fn parse_record_type(record_type: &str, provider: &str) -> Result<DnsRecordType> {
    record_type
        .parse()
        .map_err(|other: String| ProviderError::UnsupportedRecordType {
            provider: provider.to_string(),
            record_type: other,
        })
}

/// Build [`RecordData`] from the flat value/priority fields most vendors return.
///
/// SRV values are `priority weight port target`; the three-part `weight port target`
/// form takes its priority from the separate field.
pub fn record_data_from_vendor(
    provider: &str,
    record_type: DnsRecordType,
    value: &str,
    priority: Option<u16>,
) -> Result<RecordData> {
    let invalid = |detail: String| ProviderError::ParseError {
        provider: provider.to_string(),
        detail,
    };

    if record_type == DnsRecordType::Srv {
        let parts: Vec<&str> = value.split_whitespace().collect();
        let nums = |s: &str| {
            s.parse::<u16>()
                .map_err(|_| invalid(format!("invalid SRV value '{value}'")))
        };
        return match (priority, parts.as_slice()) {
            (Some(p), [w, port, target]) => Ok(RecordData::SRV {
                priority: p,
                weight: nums(w)?,
                port: nums(port)?,
                target: (*target).to_string(),
            }),
            (_, [p, w, port, target]) => Ok(RecordData::SRV {
                priority: nums(p)?,
                weight: nums(w)?,
                port: nums(port)?,
                target: (*target).to_string(),
            }),
            _ => Err(invalid(format!("invalid SRV value '{value}'"))),
        };
    }

    let priority = match record_type {
        DnsRecordType::Mx => Some(priority.unwrap_or(10)),
        _ => None,
    };
    RecordData::from_parts(record_type, value, priority, None, None)
        .map_err(|e| invalid(e.to_string()))
}

/// Flat `(value, priority)` for the RPC-style vendors: SRV is sent as
/// `priority weight port target` and only MX uses the separate priority field.
pub fn record_data_to_vendor(data: &RecordData) -> (String, Option<u16>) {
    match data {
        RecordData::SRV {
            priority,
            weight,
            port,
            target,
        } => (format!("{priority} {weight} {port} {target}"), None),
        other => (other.value(), other.priority()),
    }
}

/// Refuse to write a type the vendor's API has no form for.
pub fn ensure_writable(provider: &str, spec: &RecordSpec, unwritable: &[DnsRecordType]) -> Result<()> {
    let record_type = spec.data.record_type();
    if unwritable.contains(&record_type) {
        return Err(ProviderError::not_implemented(
            provider,
            &format!("write {record_type} record"),
        ));
    }
    Ok(())
}

// ============ HMAC-SHA256 ============

/// HMAC-SHA256（aliyun / dnspod 签名）
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC 接受任意长度的 key，new_from_slice 不会失败
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============ 域名名称处理 ============

/// 去掉域名末尾的点
pub fn normalize_domain_name(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}

/// "www.example.com" + "example.com" -> "www"; apex -> "@"
pub fn full_name_to_relative(full_name: &str, zone_name: &str) -> String {
    let full = normalize_domain_name(full_name);
    let zone = normalize_domain_name(zone_name);

    if full.eq_ignore_ascii_case(&zone) {
        "@".to_string()
    } else if let Some(subdomain) = full.strip_suffix(&format!(".{zone}")) {
        subdomain.to_string()
    } else {
        full
    }
}

/// "www" + "example.com" -> "www.example.com"; "@" -> "example.com"
pub fn relative_to_full_name(relative_name: &str, zone_name: &str) -> String {
    let zone = normalize_domain_name(zone_name);

    if relative_name == "@" || relative_name.is_empty() {
        zone
    } else {
        format!("{relative_name}.{zone}")
    }
}
