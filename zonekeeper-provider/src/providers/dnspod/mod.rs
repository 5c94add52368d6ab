//! 腾讯云 `DNSPod` Provider

mod error;
mod http;
mod provider;
mod sign;
mod types;

use reqwest::Client;

use crate::error::Result;
use crate::providers::common::create_http_client;

pub(crate) use types::{
    CreateRecordResponse, DnspodRecord, EmptyResponse, RecordListResponse, ZoneListResponse,
};

pub(crate) const DNSPOD_API_HOST: &str = "dnspod.tencentcloudapi.com";
pub(crate) const DNSPOD_SERVICE: &str = "dnspod";
pub(crate) const DNSPOD_VERSION: &str = "2021-03-23";
/// `DNSPod` API 单页最大记录数
pub(crate) const MAX_PAGE_SIZE: u32 = 100;
/// 默认解析线路
pub(crate) const DEFAULT_RECORD_LINE: &str = "默认";

/// Tencent Cloud `DNSPod` driver (TC3-HMAC-SHA256 signed JSON calls).
///
/// Zones are addressed by domain name; record ids are numeric.
pub struct DnspodProvider {
    pub(crate) client: Client,
    pub(crate) secret_id: String,
    pub(crate) secret_key: String,
    pub(crate) max_retries: u32,
}

/// Builder for [`DnspodProvider`].
pub struct DnspodProviderBuilder {
    secret_id: String,
    secret_key: String,
    max_retries: u32,
}

impl DnspodProviderBuilder {
    /// Automatic retries for transient errors (default: 2).
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn build(self) -> Result<DnspodProvider> {
        Ok(DnspodProvider {
            client: create_http_client("dnspod")?,
            secret_id: self.secret_id,
            secret_key: self.secret_key,
            max_retries: self.max_retries,
        })
    }
}

impl DnspodProvider {
    pub fn new(secret_id: String, secret_key: String) -> Result<Self> {
        Self::builder(secret_id, secret_key).build()
    }

    pub fn builder(secret_id: String, secret_key: String) -> DnspodProviderBuilder {
        DnspodProviderBuilder {
            secret_id,
            secret_key,
            max_retries: 2,
        }
    }
}
