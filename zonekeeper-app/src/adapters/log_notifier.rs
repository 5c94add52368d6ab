//! Notifier that writes expiry notifications to the log.

use async_trait::async_trait;

use zonekeeper_core::error::CoreResult;
use zonekeeper_core::traits::{Notification, NotificationKind, NotificationLevel, Notifier};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

fn describe(n: &Notification) -> String {
    let what = match n.kind {
        NotificationKind::DomainExpiry => "Domain",
        NotificationKind::CertificateExpiry => "Certificate",
    };
    if n.days_remaining < 0 {
        format!(
            "{what} {} expired {} day(s) ago ({}) [tenant {}, id {}]",
            n.subject,
            -n.days_remaining,
            n.expires_at.format("%Y-%m-%d %H:%M UTC"),
            n.tenant_id,
            n.resource_id
        )
    } else {
        format!(
            "{what} {} expires in {} day(s) at {} [tenant {}, id {}]",
            n.subject,
            n.days_remaining,
            n.expires_at.format("%Y-%m-%d %H:%M UTC"),
            n.tenant_id,
            n.resource_id
        )
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> CoreResult<()> {
        let message = describe(notification);
        match notification.level {
            NotificationLevel::Critical | NotificationLevel::Warning => log::warn!("{message}"),
            NotificationLevel::Info => log::info!("{message}"),
        }
        Ok(())
    }
}
