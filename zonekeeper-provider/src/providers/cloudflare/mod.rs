//! Cloudflare DNS Provider

mod error;
mod http;
mod provider;
mod types;

use std::collections::HashMap;
use std::sync::RwLock;

use reqwest::Client;

use crate::error::Result;
use crate::providers::common::create_http_client;

pub(crate) use types::{CfRecord, CfZone, Envelope};

pub(crate) const CF_API_BASE: &str = "https://api.cloudflare.com/client/v4";
/// Zones API 单页上限
pub(crate) const MAX_PAGE_SIZE_ZONES: u32 = 50;
/// DNS Records API 单页上限
pub(crate) const MAX_PAGE_SIZE_RECORDS: u32 = 100;

/// Cloudflare driver, authenticated with an API token.
///
/// Cloudflare addresses zones by id; the name → id mapping is cached per instance.
pub struct CloudflareProvider {
    pub(crate) client: Client,
    pub(crate) api_token: String,
    pub(crate) max_retries: u32,
    pub(crate) zone_ids: RwLock<HashMap<String, String>>,
}

impl CloudflareProvider {
    pub fn new(api_token: String) -> Result<Self> {
        Self::with_retries(api_token, 2)
    }

    /// Custom retry budget for transient failures.
    pub fn with_retries(api_token: String, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: create_http_client("cloudflare")?,
            api_token,
            max_retries,
            zone_ids: RwLock::new(HashMap::new()),
        })
    }
}
