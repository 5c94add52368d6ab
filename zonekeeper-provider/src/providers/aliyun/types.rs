//! 阿里云 API 类型定义和 query string 序列化

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};

// ============ Query string ============

/// Flatten a JSON value into `Key`, `Key.Sub` and `Key.N` (1-based) pairs.
fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_into(&join(k), v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&join(&(i + 1).to_string()), v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        serde_json::Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        serde_json::Value::Null => {}
    }
}

/// Sorted, RFC 3986 encoded query string (the canonical form the signature covers).
pub fn serialize_to_query_string<T: Serialize>(params: &T) -> Result<String> {
    let value = serde_json::to_value(params).map_err(|e| ProviderError::SerializationError {
        provider: "aliyun".to_string(),
        detail: e.to_string(),
    })?;

    let mut flat = BTreeMap::new();
    flatten_into("", &value, &mut flat);

    Ok(flat
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&"))
}

// ============ 域名相关结构 ============

#[derive(Debug, Deserialize)]
pub struct DescribeDomainsResponse {
    #[serde(rename = "Domains")]
    pub domains: Option<DomainsWrapper>,
    #[serde(rename = "TotalCount")]
    pub total_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DomainsWrapper {
    #[serde(rename = "Domain")]
    pub domain: Option<Vec<AliyunDomain>>,
}

#[derive(Debug, Deserialize)]
pub struct AliyunDomain {
    #[serde(rename = "DomainId")]
    pub domain_id: Option<String>,
    #[serde(rename = "DomainName")]
    pub domain_name: String,
    /// `DescribeDomains` 实际上通常不返回该字段
    #[serde(rename = "DomainStatus")]
    pub domain_status: Option<String>,
    #[serde(rename = "RecordCount")]
    pub record_count: Option<u32>,
}

// ============ 记录相关结构 ============

#[derive(Debug, Deserialize)]
pub struct DescribeDomainRecordsResponse {
    #[serde(rename = "DomainRecords")]
    pub domain_records: Option<DomainRecordsWrapper>,
    #[serde(rename = "TotalCount")]
    pub total_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DomainRecordsWrapper {
    #[serde(rename = "Record")]
    pub record: Option<Vec<AliyunRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct AliyunRecord {
    #[serde(rename = "RecordId")]
    pub record_id: String,
    #[serde(rename = "RR")]
    pub rr: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    #[serde(rename = "Priority")]
    pub priority: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct AddDomainRecordResponse {
    #[serde(rename = "RecordId")]
    pub record_id: String,
}

/// Update / delete only echo `RequestId` and `RecordId`.
#[derive(Debug, Deserialize)]
pub struct EmptyResponse {}
