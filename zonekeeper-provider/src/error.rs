use serde::{Deserialize, Serialize};

/// Error returned by every driver operation.
///
/// Each variant names the driver that produced it (`provider`). Callers use the
/// classification helpers instead of matching on variants directly:
///
/// - [`is_auth_failure`](Self::is_auth_failure): the credential must be fixed
/// - [`is_transient`](Self::is_transient): retrying later may succeed
/// - [`is_not_implemented`](Self::is_not_implemented): the driver does not offer the operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ProviderError {
    /// Connection refused, DNS failure, 5xx gateway errors.
    NetworkError { provider: String, detail: String },

    /// Credentials rejected (401-class).
    InvalidCredentials {
        provider: String,
        raw_message: Option<String>,
    },

    /// Credentials valid but not allowed to perform the call (403-class).
    PermissionDenied {
        provider: String,
        raw_message: Option<String>,
    },

    /// A record with the same name/type/value already exists at the provider.
    RecordExists {
        provider: String,
        record_name: String,
        raw_message: Option<String>,
    },

    RecordNotFound {
        provider: String,
        record_id: String,
        raw_message: Option<String>,
    },

    /// Zone is not hosted by this credential.
    ZoneNotFound {
        provider: String,
        zone: String,
        raw_message: Option<String>,
    },

    /// Zone is locked, suspended or disabled at the provider.
    ZoneLocked {
        provider: String,
        zone: String,
        raw_message: Option<String>,
    },

    InvalidParameter {
        provider: String,
        param: String,
        detail: String,
    },

    UnsupportedRecordType {
        provider: String,
        record_type: String,
    },

    /// The driver does not implement this operation.
    NotImplemented { provider: String, operation: String },

    /// Account quota reached. Not transient.
    QuotaExceeded {
        provider: String,
        raw_message: Option<String>,
    },

    /// HTTP 429 or a vendor throttling code.
    RateLimited {
        provider: String,
        retry_after: Option<u64>,
        raw_message: Option<String>,
    },

    Timeout { provider: String, detail: String },

    ParseError { provider: String, detail: String },

    SerializationError { provider: String, detail: String },

    /// Vendor error code with no mapping yet.
    Unknown {
        provider: String,
        raw_code: Option<String>,
        raw_message: String,
    },
}

impl ProviderError {
    /// 是否为预期行为（用户输入、资源不存在、凭证问题），用于日志分级。
    ///
    /// 返回 `true` 时应使用 `warn` 级别，`false` 时使用 `error` 级别。
    /// **新增变体时请同步更新此方法。**
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. }
                | Self::PermissionDenied { .. }
                | Self::RecordExists { .. }
                | Self::RecordNotFound { .. }
                | Self::ZoneNotFound { .. }
                | Self::ZoneLocked { .. }
                | Self::InvalidParameter { .. }
                | Self::UnsupportedRecordType { .. }
                | Self::NotImplemented { .. }
                | Self::QuotaExceeded { .. }
        )
    }

    /// Failures that may clear up on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// 401/403-class failures: the credential has to be fixed.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::PermissionDenied { .. }
        )
    }

    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    /// Name of the driver that produced the error.
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::NetworkError { provider, .. }
            | Self::InvalidCredentials { provider, .. }
            | Self::PermissionDenied { provider, .. }
            | Self::RecordExists { provider, .. }
            | Self::RecordNotFound { provider, .. }
            | Self::ZoneNotFound { provider, .. }
            | Self::ZoneLocked { provider, .. }
            | Self::InvalidParameter { provider, .. }
            | Self::UnsupportedRecordType { provider, .. }
            | Self::NotImplemented { provider, .. }
            | Self::QuotaExceeded { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::ParseError { provider, .. }
            | Self::SerializationError { provider, .. }
            | Self::Unknown { provider, .. } => provider,
        }
    }

    pub(crate) fn not_implemented(provider: &str, operation: &str) -> Self {
        Self::NotImplemented {
            provider: provider.to_string(),
            operation: operation.to_string(),
        }
    }
}

fn with_raw(f: &mut std::fmt::Formatter<'_>, head: &str, raw: Option<&String>) -> std::fmt::Result {
    match raw {
        Some(msg) => write!(f, "{head}: {msg}"),
        None => f.write_str(head),
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError { provider, detail } => {
                write!(f, "[{provider}] Network error: {detail}")
            }
            Self::InvalidCredentials {
                provider,
                raw_message,
            } => with_raw(
                f,
                &format!("[{provider}] Invalid credentials"),
                raw_message.as_ref(),
            ),
            Self::PermissionDenied {
                provider,
                raw_message,
            } => with_raw(
                f,
                &format!("[{provider}] Permission denied"),
                raw_message.as_ref(),
            ),
            Self::RecordExists {
                provider,
                record_name,
                ..
            } => write!(f, "[{provider}] Record '{record_name}' already exists"),
            Self::RecordNotFound {
                provider,
                record_id,
                ..
            } => write!(f, "[{provider}] Record '{record_id}' not found"),
            Self::ZoneNotFound {
                provider,
                zone,
                raw_message,
            } => with_raw(
                f,
                &format!("[{provider}] Zone '{zone}' not found"),
                raw_message.as_ref(),
            ),
            Self::ZoneLocked {
                provider,
                zone,
                raw_message,
            } => with_raw(
                f,
                &format!("[{provider}] Zone '{zone}' is locked"),
                raw_message.as_ref(),
            ),
            Self::InvalidParameter {
                provider,
                param,
                detail,
            } => write!(f, "[{provider}] Invalid parameter '{param}': {detail}"),
            Self::UnsupportedRecordType {
                provider,
                record_type,
            } => write!(f, "[{provider}] Unsupported record type: {record_type}"),
            Self::NotImplemented {
                provider,
                operation,
            } => write!(f, "[{provider}] Operation not implemented: {operation}"),
            Self::QuotaExceeded { provider, .. } => write!(f, "[{provider}] Quota exceeded"),
            Self::RateLimited {
                provider,
                retry_after,
                ..
            } => match retry_after {
                Some(secs) => write!(f, "[{provider}] Rate limited (retry after {secs}s)"),
                None => write!(f, "[{provider}] Rate limited"),
            },
            Self::Timeout { provider, detail } => {
                write!(f, "[{provider}] Request timeout: {detail}")
            }
            Self::ParseError { provider, detail } => {
                write!(f, "[{provider}] Parse error: {detail}")
            }
            Self::SerializationError { provider, detail } => {
                write!(f, "[{provider}] Serialization error: {detail}")
            }
            Self::Unknown {
                provider,
                raw_message,
                ..
            } => write!(f, "[{provider}] {raw_message}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Convenience type alias for `Result<T, ProviderError>`.
pub type Result<T> = std::result::Result<T, ProviderError>;
