use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============ Pagination ============

/// Page request for the paged driver primitives. Pages are 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
        }
    }
}

impl PaginationParams {
    /// Clamp `page >= 1` and `page_size` into `1..=max_page_size`.
    #[must_use]
    pub fn validated(&self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size),
        }
    }

    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            page: self.page + 1,
            page_size: self.page_size,
        }
    }
}

/// Page request for record listing, with optional server-side filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQueryParams {
    pub pagination: PaginationParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<DnsRecordType>,
}

impl RecordQueryParams {
    #[must_use]
    pub fn from_filter(filter: &RecordFilter, page: PaginationParams) -> Self {
        Self {
            pagination: page,
            name: filter.name.clone(),
            record_type: filter.record_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_count: u32,
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    /// Build a page, computing `has_more` from the totals.
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_count: u32) -> Self {
        let has_more = page.saturating_mul(page_size) < total_count;
        Self {
            items,
            page,
            page_size,
            total_count,
            has_more,
        }
    }
}

// ============ Filters ============

/// Filter for [`DnsProvider::list_zones`](crate::DnsProvider::list_zones).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneFilter {
    /// Case-insensitive substring match on the zone name.
    pub keyword: Option<String>,
}

impl ZoneFilter {
    pub fn matches(&self, zone: &ProviderZone) -> bool {
        self.keyword.as_deref().is_none_or(|k| {
            zone.name
                .to_ascii_lowercase()
                .contains(&k.to_ascii_lowercase())
        })
    }
}

/// Filter for [`DnsProvider::list_records`](crate::DnsProvider::list_records).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Exact relative name (`@` for apex).
    pub name: Option<String>,
    pub record_type: Option<DnsRecordType>,
}

impl RecordFilter {
    pub fn matches(&self, record: &DnsRecord) -> bool {
        self.name.as_deref().is_none_or(|n| n == record.name)
            && self
                .record_type
                .is_none_or(|t| t == record.data.record_type())
    }
}

// ============ Provider Types ============

/// Supported DNS vendors. The lowercase string form is the registry tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Cloudflare,
    Aliyun,
    Dnspod,
}

impl ProviderType {
    pub const ALL: [Self; 3] = [Self::Cloudflare, Self::Aliyun, Self::Dnspod];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cloudflare => "cloudflare",
            Self::Aliyun => "aliyun",
            Self::Dnspod => "dnspod",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloudflare" => Ok(Self::Cloudflare),
            "aliyun" => Ok(Self::Aliyun),
            // tencent cloud DNS is DNSPod under another name
            "dnspod" | "tencent" => Ok(Self::Dnspod),
            other => Err(format!("unsupported provider type: {other}")),
        }
    }
}

// ============ Zone Types ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Active,
    Paused,
    Pending,
    Error,
    Unknown,
}

/// A zone as seen by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderZone {
    /// Provider-side zone identifier.
    pub id: String,
    pub name: String,
    pub status: ZoneStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u32>,
}

// ============ DNS Record Types ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Txt,
    Ns,
    Srv,
    Ptr,
    Caa,
}

impl DnsRecordType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Ns => "NS",
            Self::Srv => "SRV",
            Self::Ptr => "PTR",
            Self::Caa => "CAA",
        }
    }

    /// MX and SRV carry a priority.
    pub fn has_priority(self) -> bool {
        matches!(self, Self::Mx | Self::Srv)
    }
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsRecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "CNAME" => Ok(Self::Cname),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            "NS" => Ok(Self::Ns),
            "SRV" => Ok(Self::Srv),
            "PTR" => Ok(Self::Ptr),
            "CAA" => Ok(Self::Caa),
            other => Err(other.to_string()),
        }
    }
}

/// Typed record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum RecordData {
    A {
        address: String,
    },
    AAAA {
        address: String,
    },
    CNAME {
        target: String,
    },
    MX {
        priority: u16,
        exchange: String,
    },
    TXT {
        text: String,
    },
    NS {
        nameserver: String,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    PTR {
        target: String,
    },
    CAA {
        flags: u8,
        tag: String,
        value: String,
    },
}

/// A flat record row could not be turned into [`RecordData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDataError {
    pub field: &'static str,
    pub reason: String,
}

impl std::fmt::Display for RecordDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for RecordDataError {}

impl RecordData {
    pub fn record_type(&self) -> DnsRecordType {
        match self {
            Self::A { .. } => DnsRecordType::A,
            Self::AAAA { .. } => DnsRecordType::Aaaa,
            Self::CNAME { .. } => DnsRecordType::Cname,
            Self::MX { .. } => DnsRecordType::Mx,
            Self::TXT { .. } => DnsRecordType::Txt,
            Self::NS { .. } => DnsRecordType::Ns,
            Self::SRV { .. } => DnsRecordType::Srv,
            Self::PTR { .. } => DnsRecordType::Ptr,
            Self::CAA { .. } => DnsRecordType::Caa,
        }
    }

    /// Value column as stored locally. CAA is rendered as `flags tag "value"`.
    pub fn value(&self) -> String {
        match self {
            Self::A { address } | Self::AAAA { address } => address.clone(),
            Self::CNAME { target } | Self::SRV { target, .. } | Self::PTR { target } => {
                target.clone()
            }
            Self::MX { exchange, .. } => exchange.clone(),
            Self::TXT { text } => text.clone(),
            Self::NS { nameserver } => nameserver.clone(),
            Self::CAA { flags, tag, value } => format!("{flags} {tag} \"{value}\""),
        }
    }

    pub fn priority(&self) -> Option<u16> {
        match self {
            Self::MX { priority, .. } | Self::SRV { priority, .. } => Some(*priority),
            _ => None,
        }
    }

    pub fn weight(&self) -> Option<u16> {
        match self {
            Self::SRV { weight, .. } => Some(*weight),
            _ => None,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::SRV { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// Build typed data from a flat `(type, value, priority, weight, port)` row.
    ///
    /// MX requires `priority`; SRV requires all three. CAA values are parsed from
    /// `flags tag "value"` (quotes optional).
    pub fn from_parts(
        record_type: DnsRecordType,
        value: &str,
        priority: Option<u16>,
        weight: Option<u16>,
        port: Option<u16>,
    ) -> Result<Self, RecordDataError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(RecordDataError {
                field: "value",
                reason: "must not be empty".to_string(),
            });
        }
        let required = |field: &'static str, v: Option<u16>| {
            v.ok_or_else(|| RecordDataError {
                field,
                reason: format!("required for {record_type} records"),
            })
        };

        Ok(match record_type {
            DnsRecordType::A => Self::A {
                address: value.to_string(),
            },
            DnsRecordType::Aaaa => Self::AAAA {
                address: value.to_string(),
            },
            DnsRecordType::Cname => Self::CNAME {
                target: value.to_string(),
            },
            DnsRecordType::Mx => Self::MX {
                priority: required("priority", priority)?,
                exchange: value.to_string(),
            },
            DnsRecordType::Txt => Self::TXT {
                text: value.to_string(),
            },
            DnsRecordType::Ns => Self::NS {
                nameserver: value.to_string(),
            },
            DnsRecordType::Srv => Self::SRV {
                priority: required("priority", priority)?,
                weight: required("weight", weight)?,
                port: required("port", port)?,
                target: value.to_string(),
            },
            DnsRecordType::Ptr => Self::PTR {
                target: value.to_string(),
            },
            DnsRecordType::Caa => Self::parse_caa(value)?,
        })
    }

    fn parse_caa(value: &str) -> Result<Self, RecordDataError> {
        let mut parts = value.splitn(3, char::is_whitespace);
        let (Some(flags), Some(tag), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(RecordDataError {
                field: "value",
                reason: "CAA value must look like `0 issue \"ca.example\"`".to_string(),
            });
        };
        let flags = flags.parse::<u8>().map_err(|_| RecordDataError {
            field: "value",
            reason: format!("invalid CAA flags '{flags}'"),
        })?;
        Ok(Self::CAA {
            flags,
            tag: tag.to_string(),
            value: rest.trim().trim_matches('"').to_string(),
        })
    }
}

/// A record as it exists at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    /// Provider-side record identifier.
    pub id: String,
    /// Relative name, `@` for the zone apex.
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

/// Desired content for create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSpec {
    pub name: String,
    pub ttl: u32,
    pub data: RecordData,
}

/// Target of a delete: provider id when known, otherwise the `(name, type)` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordKey {
    Id {
        id: String,
    },
    NameType {
        name: String,
        record_type: DnsRecordType,
    },
}

impl RecordKey {
    /// `Id` when a non-empty cloud id is available, otherwise the composite key.
    pub fn from_cloud_id(
        cloud_id: Option<&str>,
        name: &str,
        record_type: DnsRecordType,
    ) -> Self {
        match cloud_id.filter(|id| !id.is_empty()) {
            Some(id) => Self::Id { id: id.to_string() },
            None => Self::NameType {
                name: name.to_string(),
                record_type,
            },
        }
    }
}

/// Handle returned by [`DnsProvider::create_txt_challenge`](crate::DnsProvider::create_txt_challenge).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRecord {
    pub record_id: String,
    pub zone: String,
    pub name: String,
    pub value: String,
}

/// Outcome of [`DnsProvider::test`](crate::DnsProvider::test).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub tested_at: chrono::DateTime<chrono::Utc>,
}

// ============ Provider Metadata Types ============

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Password,
}

/// One credential field a driver needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentialField {
    /// Key in the credential map (e.g. `"apiToken"`).
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderLimits {
    pub max_page_size_zones: u32,
    pub max_page_size_records: u32,
}

/// Static description of a driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetadata {
    pub id: ProviderType,
    pub name: String,
    pub description: String,
    pub required_fields: Vec<ProviderCredentialField>,
    pub limits: ProviderLimits,
}

// ============ Credential Types ============

/// A credential map failed configuration-time validation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CredentialValidationError {
    MissingField {
        provider: ProviderType,
        field: String,
        label: String,
    },
    EmptyField {
        provider: ProviderType,
        field: String,
        label: String,
    },
    /// Provider type not compiled in or not registered.
    UnsupportedProvider { provider: String },
}

impl std::fmt::Display for CredentialValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { label, .. } => write!(f, "Missing required field: {label}"),
            Self::EmptyField { label, .. } => write!(f, "Field must not be empty: {label}"),
            Self::UnsupportedProvider { provider } => {
                write!(f, "Provider '{provider}' is not supported")
            }
        }
    }
}

impl std::error::Error for CredentialValidationError {}

/// Typed credentials per vendor.
///
/// Stored as a flat string map (the vault encrypts the JSON of that map);
/// `from_map` / `to_map` convert between the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", content = "credentials")]
pub enum ProviderCredentials {
    #[cfg(feature = "cloudflare")]
    #[serde(rename = "cloudflare")]
    Cloudflare { api_token: String },

    #[cfg(feature = "aliyun")]
    #[serde(rename = "aliyun")]
    Aliyun {
        access_key_id: String,
        access_key_secret: String,
    },

    #[cfg(feature = "dnspod")]
    #[serde(rename = "dnspod")]
    Dnspod {
        secret_id: String,
        secret_key: String,
    },
}

impl ProviderCredentials {
    /// Validate and convert a flat credential map.
    pub fn from_map(
        provider: ProviderType,
        map: &HashMap<String, String>,
    ) -> Result<Self, CredentialValidationError> {
        match provider {
            #[cfg(feature = "cloudflare")]
            ProviderType::Cloudflare => Ok(Self::Cloudflare {
                api_token: Self::get_required_field(provider, map, "apiToken", "API Token")?,
            }),
            #[cfg(feature = "aliyun")]
            ProviderType::Aliyun => Ok(Self::Aliyun {
                access_key_id: Self::get_required_field(
                    provider,
                    map,
                    "accessKeyId",
                    "Access Key ID",
                )?,
                access_key_secret: Self::get_required_field(
                    provider,
                    map,
                    "accessKeySecret",
                    "Access Key Secret",
                )?,
            }),
            #[cfg(feature = "dnspod")]
            ProviderType::Dnspod => Ok(Self::Dnspod {
                secret_id: Self::get_required_field(provider, map, "secretId", "Secret ID")?,
                secret_key: Self::get_required_field(provider, map, "secretKey", "Secret Key")?,
            }),
            #[allow(unreachable_patterns)]
            _ => Err(CredentialValidationError::UnsupportedProvider {
                provider: provider.to_string(),
            }),
        }
    }

    fn get_required_field(
        provider: ProviderType,
        map: &HashMap<String, String>,
        key: &str,
        label: &str,
    ) -> Result<String, CredentialValidationError> {
        match map.get(key) {
            None => Err(CredentialValidationError::MissingField {
                provider,
                field: key.to_string(),
                label: label.to_string(),
            }),
            Some(v) if v.trim().is_empty() => Err(CredentialValidationError::EmptyField {
                provider,
                field: key.to_string(),
                label: label.to_string(),
            }),
            Some(v) => Ok(v.trim().to_string()),
        }
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        match self {
            #[cfg(feature = "cloudflare")]
            Self::Cloudflare { api_token } => [("apiToken".to_string(), api_token.clone())].into(),
            #[cfg(feature = "aliyun")]
            Self::Aliyun {
                access_key_id,
                access_key_secret,
            } => [
                ("accessKeyId".to_string(), access_key_id.clone()),
                ("accessKeySecret".to_string(), access_key_secret.clone()),
            ]
            .into(),
            #[cfg(feature = "dnspod")]
            Self::Dnspod {
                secret_id,
                secret_key,
            } => [
                ("secretId".to_string(), secret_id.clone()),
                ("secretKey".to_string(), secret_key.clone()),
            ]
            .into(),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            #[cfg(feature = "cloudflare")]
            Self::Cloudflare { .. } => ProviderType::Cloudflare,
            #[cfg(feature = "aliyun")]
            Self::Aliyun { .. } => ProviderType::Aliyun,
            #[cfg(feature = "dnspod")]
            Self::Dnspod { .. } => ProviderType::Dnspod,
        }
    }
}
