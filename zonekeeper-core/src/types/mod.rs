//! 类型定义模块

/// `as_str` / `Display` / `FromStr` for plain string-backed enums.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($ty), ": {}"), other)),
                }
            }
        }
    };
}

mod certificate;
mod change_log;
mod common;
mod provider;
mod record;
mod sync;
mod zone;

pub use certificate::{
    CaType, Certificate, CertificateDeployment, CertificateDetails, CertificateFile,
    CertificateMaterial, CertificatePatch, CertificateQuery, CertificateStats, CertificateStatus,
    CsrIssueRequest, CsrValidation, DeployTarget, DeploymentStatus, DownloadFormat,
    IssueCertificateRequest, KeyType, UploadCertificateRequest,
};
pub use change_log::{resource, ChangeAction, ChangeLogEntry, ChangeLogQuery, ChangeStatus};
pub use common::{Actor, BatchFailure, BatchOutcome, Page, PageRequest};
pub use provider::{
    CreateProviderRequest, HealthReport, HealthStatus, HealthUpdate, Provider, ProviderStatus,
    UpdateProviderRequest,
};
pub use record::{CreateRecordRequest, Record, RecordQuery, SyncStatus, UpdateRecordRequest};
pub use sync::{
    ApplyOutcome, RecordUpdate, SyncDiff, SyncItemError, SyncOptions, SyncRequest, SyncResult,
};
pub use zone::{CreateZoneRequest, UpdateZoneRequest, Zone, ZoneImportResult, ZoneQuery, ZoneStatus};

// Re-export provider 库的公共类型
pub use zonekeeper_provider::{
    ChallengeRecord, CredentialValidationError, DnsRecord, DnsRecordType, HealthCheck,
    ProviderMetadata, ProviderType, ProviderZone, RecordData, RecordKey, RecordSpec,
};
