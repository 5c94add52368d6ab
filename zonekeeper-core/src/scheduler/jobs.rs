//! 内置定时任务

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::Job;
use crate::error::CoreResult;
use crate::services::{log_core_error, CertificateManager, ProviderService, ServiceContext, SyncService};
use crate::traits::{Notification, NotificationKind, NotificationLevel, Notifier};
use crate::types::{Actor, CertificateStatus};

/// Widest notification window.
const NOTIFY_WINDOW_DAYS: i64 = 30;

/// Whole days left hit a reminder threshold: 30, 7, 1, or already below one day.
pub fn is_notify_day(days_remaining: i64) -> bool {
    matches!(days_remaining, 30 | 7 | 1) || days_remaining < 1
}

async fn send(
    notifier: &dyn Notifier,
    kind: NotificationKind,
    tenant_id: &str,
    resource_id: &str,
    subject: &str,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let days_remaining = (expires_at - now).num_days();
    if !is_notify_day(days_remaining) {
        return false;
    }
    let notification = Notification {
        kind,
        level: NotificationLevel::for_days(days_remaining),
        tenant_id: tenant_id.to_string(),
        resource_id: resource_id.to_string(),
        subject: subject.to_string(),
        days_remaining,
        expires_at,
    };
    match notifier.notify(&notification).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Failed to send expiry notice for {subject}: {e}");
            false
        }
    }
}

// ============ 到期提醒 ============

pub struct DomainExpiryJob {
    ctx: Arc<ServiceContext>,
    notifier: Arc<dyn Notifier>,
}

impl DomainExpiryJob {
    pub fn new(ctx: Arc<ServiceContext>, notifier: Arc<dyn Notifier>) -> Self {
        Self { ctx, notifier }
    }
}

#[async_trait]
impl Job for DomainExpiryJob {
    fn name(&self) -> &'static str {
        "domain_expiry"
    }

    async fn run(&self) -> CoreResult<()> {
        let now = Utc::now();
        let zones = self
            .ctx
            .repos
            .zones
            .list_expiring(now + Duration::days(NOTIFY_WINDOW_DAYS + 1))
            .await?;

        let mut sent = 0;
        for zone in &zones {
            let Some(expires_at) = zone.expires_at else { continue };
            if send(
                self.notifier.as_ref(),
                NotificationKind::DomainExpiry,
                &zone.tenant_id,
                &zone.id,
                &zone.name,
                expires_at,
                now,
            )
            .await
            {
                sent += 1;
            }
        }
        log::info!("Domain expiry check: {} candidates, {sent} notices", zones.len());
        Ok(())
    }
}

pub struct CertificateExpiryJob {
    ctx: Arc<ServiceContext>,
    notifier: Arc<dyn Notifier>,
}

impl CertificateExpiryJob {
    pub fn new(ctx: Arc<ServiceContext>, notifier: Arc<dyn Notifier>) -> Self {
        Self { ctx, notifier }
    }
}

#[async_trait]
impl Job for CertificateExpiryJob {
    fn name(&self) -> &'static str {
        "certificate_expiry"
    }

    async fn run(&self) -> CoreResult<()> {
        let now = Utc::now();
        let certs = self
            .ctx
            .repos
            .certificates
            .list_by_status(CertificateStatus::Issued)
            .await?;

        let mut sent = 0;
        for cert in &certs {
            let Some(expires_at) = cert.expires_at else { continue };
            if send(
                self.notifier.as_ref(),
                NotificationKind::CertificateExpiry,
                &cert.tenant_id,
                &cert.id,
                &cert.common_name,
                expires_at,
                now,
            )
            .await
            {
                sent += 1;
            }
        }
        log::info!("Certificate expiry check: {} issued, {sent} notices", certs.len());
        Ok(())
    }
}

// ============ 同步 / 续期 / 健康检查 ============

/// Reconciles every zone of every active provider.
pub struct ZoneSyncJob {
    ctx: Arc<ServiceContext>,
    sync: SyncService,
}

impl ZoneSyncJob {
    pub fn new(ctx: Arc<ServiceContext>, sync: SyncService) -> Self {
        Self { ctx, sync }
    }
}

#[async_trait]
impl Job for ZoneSyncJob {
    fn name(&self) -> &'static str {
        "zone_sync"
    }

    async fn run(&self) -> CoreResult<()> {
        let providers = self.ctx.repos.providers.list_active().await?;
        for provider in &providers {
            match self.sync.sync_provider_zones(provider).await {
                Ok(outcome) if outcome.failure_count > 0 => log::warn!(
                    "Provider {}: {} zones synced, {} failed",
                    provider.name,
                    outcome.success_count,
                    outcome.failure_count
                ),
                Ok(outcome) => log::debug!(
                    "Provider {}: {} zones synced",
                    provider.name,
                    outcome.success_count
                ),
                Err(e) => log_core_error(&format!("Zone sync for provider {} failed", provider.name), &e),
            }
        }
        Ok(())
    }
}

/// Renews every issued certificate that entered its renewal window.
///
/// A failed renewal leaves the row `renew_failed`; nothing is retried inside the run.
pub struct AutoRenewJob {
    ctx: Arc<ServiceContext>,
    manager: CertificateManager,
}

impl AutoRenewJob {
    pub fn new(ctx: Arc<ServiceContext>, manager: CertificateManager) -> Self {
        Self { ctx, manager }
    }
}

#[async_trait]
impl Job for AutoRenewJob {
    fn name(&self) -> &'static str {
        "certificate_auto_renew"
    }

    async fn run(&self) -> CoreResult<()> {
        let now = Utc::now();
        let due: Vec<_> = self
            .ctx
            .repos
            .certificates
            .list_by_status(CertificateStatus::Issued)
            .await?
            .into_iter()
            .filter(|c| c.is_due_for_renewal(now))
            .collect();

        if due.is_empty() {
            log::debug!("No certificates due for renewal");
            return Ok(());
        }

        let (mut renewed, mut failed) = (0, 0);
        for cert in due {
            let actor = Actor::system(&cert.tenant_id);
            match self.manager.renew(&cert.id, &actor).await {
                Ok(successor) => {
                    renewed += 1;
                    log::info!("Certificate {} renewed as {}", cert.id, successor.id);
                }
                Err(e) => {
                    failed += 1;
                    log_core_error(&format!("Auto-renewal of certificate {} failed", cert.id), &e);
                }
            }
        }
        log::info!("Auto-renew finished: {renewed} renewed, {failed} failed");
        Ok(())
    }
}

pub struct HealthCheckJob {
    providers: ProviderService,
}

impl HealthCheckJob {
    pub fn new(providers: ProviderService) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Job for HealthCheckJob {
    fn name(&self) -> &'static str {
        "provider_health"
    }

    async fn run(&self) -> CoreResult<()> {
        self.providers.check_all_health().await.map(|_| ())
    }
}

// ============ 清理 ============

pub struct ChangeLogCleanupJob {
    ctx: Arc<ServiceContext>,
    retention_days: u32,
}

impl ChangeLogCleanupJob {
    pub fn new(ctx: Arc<ServiceContext>, retention_days: u32) -> Self {
        Self { ctx, retention_days }
    }
}

#[async_trait]
impl Job for ChangeLogCleanupJob {
    fn name(&self) -> &'static str {
        "change_log_cleanup"
    }

    async fn run(&self) -> CoreResult<()> {
        if self.retention_days == 0 {
            return Ok(());
        }
        let cutoff = Utc::now() - Duration::days(i64::from(self.retention_days));
        let removed = self.ctx.repos.change_logs.delete_older_than(cutoff).await?;
        if removed > 0 {
            log::info!("Removed {removed} change log entries older than {cutoff}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{issued_certificate, RecordingNotifier, TestEnv};
    use crate::types::{ChangeAction, ChangeLogEntry, ZoneStatus};

    #[test]
    fn notify_days() {
        for days in [30, 7, 1, 0, -4] {
            assert!(is_notify_day(days), "{days}");
        }
        for days in [31, 29, 8, 6, 2] {
            assert!(!is_notify_day(days), "{days}");
        }
    }

    #[tokio::test]
    async fn domain_notices_on_threshold_days_only() {
        let env = TestEnv::new();
        let now = Utc::now();
        for (name, days) in [("a.com", 7), ("b.com", 12), ("c.com", 30), ("d.com", 90)] {
            let mut zone = env.seed_zone(name, None).await;
            zone.expires_at = Some(now + Duration::days(days) + Duration::hours(1));
            zone.status = ZoneStatus::Active;
            env.ctx.repos.zones.update(&zone, None).await.unwrap();
        }

        let notifier = Arc::new(RecordingNotifier::default());
        DomainExpiryJob::new(env.ctx.clone(), notifier.clone())
            .run()
            .await
            .unwrap();

        let mut sent: Vec<(String, NotificationLevel)> = notifier
            .sent()
            .into_iter()
            .map(|n| (n.subject, n.level))
            .collect();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("a.com".to_string(), NotificationLevel::Warning),
                ("c.com".to_string(), NotificationLevel::Info),
            ]
        );
    }

    #[tokio::test]
    async fn certificate_notices_include_expired() {
        let env = TestEnv::new();
        let now = Utc::now();
        let mut tomorrow = issued_certificate("c1", "a.example.com");
        tomorrow.expires_at = Some(now + Duration::days(1) + Duration::hours(1));
        let mut expired = issued_certificate("c2", "b.example.com");
        expired.expires_at = Some(now - Duration::days(2));
        let mut fine = issued_certificate("c3", "c.example.com");
        fine.expires_at = Some(now + Duration::days(50));
        for cert in [tomorrow, expired, fine] {
            env.store.put_certificate(cert);
        }

        let notifier = Arc::new(RecordingNotifier::default());
        CertificateExpiryJob::new(env.ctx.clone(), notifier.clone())
            .run()
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|n| n.level == NotificationLevel::Critical));
        assert!(sent.iter().all(|n| n.kind == NotificationKind::CertificateExpiry));
    }

    #[tokio::test]
    async fn auto_renew_picks_due_certificates() {
        let env = TestEnv::new();
        let due = env.seed_issued_certificate("a.example.com").await;
        let later = env.seed_issued_certificate("b.example.com").await;

        let now = Utc::now();
        for (id, days) in [(&due.id, 10), (&later.id, 60)] {
            let mut cert = env.store.certificate(id).unwrap();
            cert.expires_at = Some(now + Duration::days(days));
            env.store.put_certificate(cert);
        }

        AutoRenewJob::new(env.ctx.clone(), env.certificates())
            .run()
            .await
            .unwrap();

        let after = env.store.certificates();
        let status_of = |id: &str| after.iter().find(|c| c.id == id).unwrap().status;
        assert_eq!(status_of(&due.id), CertificateStatus::Renewed);
        assert_eq!(status_of(&later.id), CertificateStatus::Issued);

        let successor = after
            .iter()
            .find(|c| c.renewed_from.as_deref() == Some(due.id.as_str()))
            .unwrap();
        assert_eq!(successor.status, CertificateStatus::Issued);
    }

    #[tokio::test]
    async fn auto_renew_failure_marks_row() {
        let env = TestEnv::new();
        let cert = env.seed_issued_certificate("a.example.com").await;
        let mut row = env.store.certificate(&cert.id).unwrap();
        row.expires_at = Some(Utc::now() + Duration::days(3));
        env.store.put_certificate(row);
        env.issuer.fail_with(Some("rate limited"));

        AutoRenewJob::new(env.ctx.clone(), env.certificates())
            .run()
            .await
            .unwrap();

        let row = env.store.certificate(&cert.id).unwrap();
        assert_eq!(row.status, CertificateStatus::RenewFailed);
        assert!(row.error_message.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn cleanup_drops_old_entries() {
        let env = TestEnv::new();
        let actor = env.actor();
        let mut old = ChangeLogEntry::new(&actor, "zone", "z1", ChangeAction::Create);
        old.created_at = Utc::now() - Duration::days(120);
        let fresh = ChangeLogEntry::new(&actor, "zone", "z2", ChangeAction::Create);
        env.ctx.repos.change_logs.append(&old).await.unwrap();
        env.ctx.repos.change_logs.append(&fresh).await.unwrap();

        ChangeLogCleanupJob::new(env.ctx.clone(), 90).run().await.unwrap();

        let left = env.store.audit_entries();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].resource_id, "z2");
    }
}
