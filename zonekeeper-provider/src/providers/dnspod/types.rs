//! `DNSPod` API payloads
//!
//! Tencent Cloud uses PascalCase keys; the few acronyms (`TTL`, `MX`, `DNSStatus`)
//! are renamed by hand.

use serde::Deserialize;

/// `{"Response": {...}}` envelope; errors arrive as `Response.Error`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    pub response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

// ============ 域名 ============

/// `DescribeDomainList`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ZoneListResponse {
    #[serde(rename = "DomainList", default)]
    pub zones: Vec<DnspodZone>,
    #[serde(rename = "DomainCountInfo")]
    count: Option<ZoneCount>,
}

impl ZoneListResponse {
    /// Zones visible to the credential, across all pages.
    pub fn total(&self) -> u32 {
        self.count.as_ref().and_then(|c| c.all_total).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ZoneCount {
    all_total: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnspodZone {
    #[serde(rename = "DomainId")]
    pub id: u64,
    pub name: String,
    /// `ENABLE` / `PAUSE` / `SPAM` ...
    #[serde(default)]
    pub status: String,
    /// NS 是否已指向 DNSPod
    #[serde(rename = "DNSStatus", default)]
    pub dns_status: String,
    pub record_count: Option<u32>,
}

// ============ 记录 ============

/// `DescribeRecordList`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordListResponse {
    #[serde(rename = "RecordList", default)]
    pub records: Vec<DnspodRecord>,
    #[serde(rename = "RecordCountInfo")]
    count: Option<RecordCount>,
}

impl RecordListResponse {
    /// Records matching the query, across all pages.
    pub fn total(&self) -> u32 {
        self.count.as_ref().and_then(|c| c.total_count).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecordCount {
    total_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnspodRecord {
    #[serde(rename = "RecordId")]
    pub id: u64,
    /// 相对记录名，apex 为 `@`
    pub name: String,
    #[serde(rename = "Type")]
    pub record_type: String,
    pub value: String,
    #[serde(rename = "TTL")]
    pub ttl: u32,
    /// MX 优先级；其他类型为 0 或缺省
    #[serde(rename = "MX")]
    pub mx: Option<u16>,
}

/// `CreateRecord`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRecordResponse {
    pub record_id: u64,
}

/// `ModifyRecord` / `DeleteRecord` only echo a `RequestId`.
#[derive(Debug, Deserialize)]
pub struct EmptyResponse {}
