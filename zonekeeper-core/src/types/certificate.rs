//! 证书生命周期相关类型

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::common::PageRequest;
use crate::error::CoreError;

// ============ 枚举 ============

/// `pending → processing → issued → {renewed | revoked | renew_failed}`; `failed` ends a
/// first issuance whose ACME flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Pending,
    Processing,
    Issued,
    Renewed,
    Revoked,
    RenewFailed,
    Failed,
}

string_enum!(CertificateStatus {
    Pending => "pending",
    Processing => "processing",
    Issued => "issued",
    Renewed => "renewed",
    Revoked => "revoked",
    RenewFailed => "renew_failed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaType {
    #[serde(rename = "letsencrypt")]
    LetsEncrypt,
    Uploaded,
    Custom,
}

string_enum!(CaType { LetsEncrypt => "letsencrypt", Uploaded => "uploaded", Custom => "custom" });

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[default]
    #[serde(rename = "RSA2048")]
    Rsa2048,
    #[serde(rename = "RSA4096")]
    Rsa4096,
    #[serde(rename = "ECDSA256")]
    Ecdsa256,
    #[serde(rename = "ECDSA384")]
    Ecdsa384,
}

string_enum!(KeyType {
    Rsa2048 => "RSA2048",
    Rsa4096 => "RSA4096",
    Ecdsa256 => "ECDSA256",
    Ecdsa384 => "ECDSA384",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Success,
    Failed,
}

string_enum!(DeploymentStatus { Pending => "pending", Success => "success", Failed => "failed" });

// ============ Certificate ============

/// One certificate lifecycle instance. Rows are append-only across renewals:
/// a renewal inserts a new row pointing back through `renewed_from`.
///
/// The `*_enc` blobs are vault-sealed and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id: Option<String>,
    /// Driver used for DNS-01, reused on renewal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    pub common_name: String,
    /// Every DNS name on the certificate, common name first.
    pub subject_alt_names: Vec<String>,
    pub ca_type: CaType,
    pub status: CertificateStatus,
    pub key_type: KeyType,
    pub challenge_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing, default)]
    pub certificate_enc: Option<String>,
    #[serde(skip_serializing, default)]
    pub private_key_enc: Option<String>,
    #[serde(skip_serializing, default)]
    pub chain_enc: Option<String>,
    /// Caller-supplied CSR; the private key then stays with the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csr_pem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// SHA-256 of the leaf DER, lowercase hex
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    /// Renew this many days before expiry.
    pub renew_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_renew_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renewed_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// `status = issued`, `auto_renew`, and `expires_at - renew_days <= now`.
    pub fn is_due_for_renewal(&self, now: DateTime<Utc>) -> bool {
        self.status == CertificateStatus::Issued
            && self.auto_renew
            && self
                .expires_at
                .is_some_and(|exp| exp - Duration::days(i64::from(self.renew_days)) <= now)
    }

    /// Whole days until expiry, negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| (exp - now).num_days())
    }

    /// File-name-safe common name (`*` becomes `_`).
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.common_name.replace('*', "_"), self.id)
    }
}

/// Fields written together with a status transition.
///
/// `Some` fields overwrite; `error_message` always overwrites, so a successful
/// transition clears a previous error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificatePatch {
    pub certificate_enc: Option<String>,
    pub private_key_enc: Option<String>,
    pub chain_enc: Option<String>,
    pub serial_number: Option<String>,
    pub fingerprint: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_renew_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub updated_by: Option<String>,
}

impl CertificatePatch {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, cert: &mut Certificate, now: DateTime<Utc>) {
        macro_rules! set {
            ($($field:ident),+) => {
                $(if let Some(v) = &self.$field {
                    cert.$field = Some(v.clone());
                })+
            };
        }
        set!(
            certificate_enc,
            private_key_enc,
            chain_enc,
            serial_number,
            fingerprint,
            issued_at,
            expires_at,
            last_renew_at
        );
        cert.error_message.clone_from(&self.error_message);
        if let Some(by) = &self.updated_by {
            cert.updated_by.clone_from(by);
        }
        cert.updated_at = now;
    }
}

// ============ 请求 ============

/// One host to receive a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployTarget {
    pub host: String,
    pub deploy_path: Option<String>,
    pub service_name: Option<String>,
}

impl DeployTarget {
    pub const DEFAULT_PATH: &'static str = "/etc/ssl/certs/";
    pub const DEFAULT_SERVICE: &'static str = "nginx";

    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            deploy_path: None,
            service_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    pub zone_id: String,
    pub domains: Vec<String>,
    pub email: String,
    pub provider_id: String,
    #[serde(default)]
    pub key_type: KeyType,
    pub auto_renew: Option<bool>,
    pub renew_days: Option<u32>,
    #[serde(default)]
    pub deploy_hosts: Vec<DeployTarget>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrIssueRequest {
    pub zone_id: String,
    pub csr_pem: String,
    pub domains: Vec<String>,
    pub email: String,
    pub provider_id: String,
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub deploy_hosts: Vec<DeployTarget>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCertificateRequest {
    pub zone_id: Option<String>,
    pub certificate_pem: String,
    pub private_key_pem: String,
    pub chain_pem: Option<String>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateQuery {
    pub tenant_id: String,
    /// Substring match on the common name.
    pub keyword: Option<String>,
    pub status: Option<CertificateStatus>,
    pub ca_type: Option<CaType>,
    pub zone_id: Option<String>,
    pub auto_renew: Option<bool>,
    #[serde(default)]
    pub page: PageRequest,
}

impl CertificateQuery {
    pub fn matches(&self, cert: &Certificate) -> bool {
        cert.tenant_id == self.tenant_id
            && self
                .keyword
                .as_deref()
                .is_none_or(|k| cert.common_name.contains(k))
            && self.status.is_none_or(|s| cert.status == s)
            && self.ca_type.is_none_or(|c| cert.ca_type == c)
            && self
                .zone_id
                .as_deref()
                .is_none_or(|z| cert.zone_id.as_deref() == Some(z))
            && self.auto_renew.is_none_or(|a| cert.auto_renew == a)
    }
}

// ============ 结果 ============

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_ca_type: BTreeMap<String, u64>,
    pub expiring_in_30_days: u64,
    pub expiring_in_7_days: u64,
    pub auto_renew_pending: u64,
}

/// Parsed CSR for display. `valid = false` carries the reason in `error_message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrValidation {
    pub valid: bool,
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub organization: String,
    pub country: String,
    pub key_algorithm: String,
    pub key_size: u32,
    pub signature_algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CsrValidation {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDetails {
    pub common_name: String,
    pub subject_alt_names: Vec<String>,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub days_remaining: i64,
    pub key_algorithm: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadFormat {
    Pem,
    Crt,
    Key,
    Chain,
}

impl FromStr for DownloadFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pem" => Ok(Self::Pem),
            "crt" => Ok(Self::Crt),
            "key" => Ok(Self::Key),
            "chain" => Ok(Self::Chain),
            _ => Err(CoreError::ValidationError(format!("unsupported format: {s}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateFile {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

/// Decrypted material handed to a deployer. The key is redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateMaterial {
    pub certificate_pem: String,
    pub private_key_pem: Option<String>,
    pub chain_pem: Option<String>,
}

impl CertificateMaterial {
    /// Leaf followed by the chain.
    pub fn fullchain(&self) -> String {
        match &self.chain_pem {
            Some(chain) => format!("{}\n{}", self.certificate_pem.trim_end(), chain.trim_start()),
            None => self.certificate_pem.clone(),
        }
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("certificate_pem", &format_args!("{} bytes", self.certificate_pem.len()))
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("chain_pem", &self.chain_pem.as_ref().map(String::len))
            .finish()
    }
}

// ============ Deployment ============

/// One (certificate, host) deployment attempt; immutable once terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateDeployment {
    pub id: String,
    pub certificate_id: String,
    pub tenant_id: String,
    pub host: String,
    pub deploy_path: String,
    pub service_name: String,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificateDeployment {
    pub fn target(&self) -> DeployTarget {
        DeployTarget {
            host: self.host.clone(),
            deploy_path: Some(self.deploy_path.clone()),
            service_name: Some(self.service_name.clone()),
        }
    }
}
