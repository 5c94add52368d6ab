//! # zonekeeper-provider
//!
//! Vendor-neutral DNS driver abstraction used by the zonekeeper reconciliation
//! engine and the ACME DNS-01 challenge adapter.
//!
//! ## Supported Providers
//!
//! | Provider | Feature Flag | Auth Method |
//! |----------|-------------|-------------|
//! | [Cloudflare](https://www.cloudflare.com/) | `cloudflare` | Bearer Token |
//! | [Aliyun DNS](https://www.aliyun.com/product/dns) | `aliyun` | ACS3-HMAC-SHA256 |
//! | [DNSPod (Tencent Cloud)](https://www.dnspod.cn/) | `dnspod` | TC3-HMAC-SHA256 |
//!
//! ## Feature Flags
//!
//! - **`all-providers`** *(default)*: every driver above.
//! - **`cloudflare`**, **`aliyun`**, **`dnspod`**: a single driver.
//! - **`native-tls`** *(default)* or **`rustls`**: TLS backend for `reqwest`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//!
//! use zonekeeper_provider::{ProviderRegistry, ProviderType, RecordFilter, ZoneFilter};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ProviderRegistry::builtin();
//! let credentials = HashMap::from([("apiToken".to_string(), "your-token".to_string())]);
//! let provider = registry.create(ProviderType::Cloudflare, &credentials)?;
//!
//! for zone in provider.list_zones(&ZoneFilter::default()).await? {
//!     for record in provider.list_records(&zone.name, &RecordFilter::default()).await? {
//!         println!("{} {} {}", record.name, record.data.record_type(), record.data.value());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every operation returns [`Result<T, ProviderError>`](ProviderError). Use
//! [`ProviderError::is_auth_failure`], [`ProviderError::is_transient`] and
//! [`ProviderError::is_not_implemented`] to tell "fix the credential" from
//! "retry later" from "unsupported". Transient errors are already retried with
//! exponential backoff inside the drivers.

mod error;
mod factory;
mod http_client;
mod providers;
mod traits;
mod types;
mod utils;

pub use error::{ProviderError, Result};

pub use factory::{ProviderConstructor, ProviderRegistry, RegistryError};

pub use traits::{DnsProvider, with_deadline};

pub use types::{
    ChallengeRecord, CredentialValidationError, DnsRecord, DnsRecordType, FieldType,
    PaginatedResponse, PaginationParams, HealthCheck, ProviderCredentialField, ProviderCredentials,
    ProviderLimits, ProviderMetadata, ProviderType, ProviderZone, RecordData, RecordDataError,
    RecordFilter, RecordKey, RecordQueryParams, RecordSpec, ZoneFilter, ZoneStatus,
};

pub use providers::common::{full_name_to_relative, normalize_domain_name, relative_to_full_name};

#[cfg(feature = "cloudflare")]
pub use providers::CloudflareProvider;

#[cfg(feature = "aliyun")]
pub use providers::{AliyunProvider, AliyunProviderBuilder};

#[cfg(feature = "dnspod")]
pub use providers::{DnspodProvider, DnspodProviderBuilder};
