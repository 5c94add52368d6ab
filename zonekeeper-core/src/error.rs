//! Unified error type definition

use serde::Serialize;
use thiserror::Error;

pub use zonekeeper_provider::{CredentialValidationError, ProviderError, RegistryError};

/// Core layer error type
#[derive(Error, Debug, Serialize)]
#[serde(tag = "code", content = "details")]
pub enum CoreError {
    /// Bad input, rejected before any provider call
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    /// Uniqueness or reference conflict (duplicate name, provider still in use, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Certificate state machine violation
    #[error("Certificate {certificate_id} is {status}, cannot {operation}")]
    InvalidState {
        certificate_id: String,
        status: String,
        operation: String,
    },

    /// Requested certificate material was never captured
    #[error("{0}")]
    MaterialUnavailable(String),

    /// Stored credential blob is unusable
    #[error("Credential error: {0}")]
    CredentialError(String),

    /// Credential map failed field validation (structured, supports field level errors)
    #[error("{0}")]
    CredentialValidation(CredentialValidationError),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("ACME error: {0}")]
    AcmeError(String),

    /// PEM / DER / key material could not be parsed or does not match
    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Worker queue is full")]
    QueueFull,

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// Provider error (converting from library)
    #[error("{0}")]
    Provider(#[from] ProviderError),
}

impl CoreError {
    /// Whether it is expected behavior (user input, resource does not exist, etc.) is used for log classification.
    ///
    /// Level `warn` should be used when returning `true` and level `error` when returning `false`.
    /// **Please update this method simultaneously when new variants are added.**
    #[must_use]
    pub fn is_expected(&self) -> bool {
        match self {
            Self::ValidationError(_)
            | Self::ZoneNotFound(_)
            | Self::ProviderNotFound(_)
            | Self::RecordNotFound(_)
            | Self::CertificateNotFound(_)
            | Self::DeploymentNotFound(_)
            | Self::Conflict(_)
            | Self::InvalidState { .. }
            | Self::MaterialUnavailable(_)
            | Self::CredentialValidation(_)
            | Self::UnsupportedProvider(_) => true,
            Self::Provider(e) => e.is_expected(),
            _ => false,
        }
    }

    /// The provider type or the operation is not offered by the driver.
    #[must_use]
    pub fn is_provider_unsupported(&self) -> bool {
        match self {
            Self::UnsupportedProvider(_) => true,
            Self::Provider(e) => e.is_not_implemented(),
            _ => false,
        }
    }

    /// 凭证被拒绝（401/403 类）
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_auth_failure())
    }

    pub(crate) fn invalid_state(
        certificate_id: &str,
        status: impl std::fmt::Display,
        operation: &str,
    ) -> Self {
        Self::InvalidState {
            certificate_id: certificate_id.to_string(),
            status: status.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<RegistryError> for CoreError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Credentials(CredentialValidationError::UnsupportedProvider {
                provider,
            }) => Self::UnsupportedProvider(provider),
            RegistryError::Credentials(e) => Self::CredentialValidation(e),
            RegistryError::Provider(e) => Self::Provider(e),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Core layer Result type alias
pub type CoreResult<T> = std::result::Result<T, CoreError>;
