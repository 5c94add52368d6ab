//! 到期提醒出口 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Critical,
}

impl NotificationLevel {
    /// ≤1 day critical, ≤7 warning, otherwise info.
    pub fn for_days(days_remaining: i64) -> Self {
        match days_remaining {
            ..=1 => Self::Critical,
            2..=7 => Self::Warning,
            _ => Self::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DomainExpiry,
    CertificateExpiry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub kind: NotificationKind,
    pub level: NotificationLevel,
    pub tenant_id: String,
    pub resource_id: String,
    /// Domain name or certificate common name
    pub subject: String,
    pub days_remaining: i64,
    pub expires_at: DateTime<Utc>,
}

/// Delivers expiry notifications. Formatting and transport are up to the implementation.
///
/// Implementations:
/// - App: `LogNotifier`
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_by_days() {
        assert_eq!(NotificationLevel::for_days(-3), NotificationLevel::Critical);
        assert_eq!(NotificationLevel::for_days(1), NotificationLevel::Critical);
        assert_eq!(NotificationLevel::for_days(7), NotificationLevel::Warning);
        assert_eq!(NotificationLevel::for_days(30), NotificationLevel::Info);
    }
}
