//! 定时任务调度
//!
//! 每个任务一个 tokio 循环：等到下一次触发时间，执行，再等待。
//! 同一任务的两次执行永远不会重叠（包括 `run_now` 手动触发）。

mod jobs;

pub use jobs::{
    is_notify_day, AutoRenewJob, CertificateExpiryJob, ChangeLogCleanupJob, DomainExpiryJob,
    HealthCheckJob, ZoneSyncJob,
};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::{DailyTime, SchedulerConfig};
use crate::error::{CoreError, CoreResult};
use crate::services::{CertificateManager, ProviderService, ServiceContext, SyncService};
use crate::traits::Notifier;

/// A periodic unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// One pass over the job's batch. Per-item failures are logged, not returned.
    async fn run(&self) -> CoreResult<()>;
}

/// When a job fires. Wall-clock times are UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSchedule {
    Every(Duration),
    DailyAt { hour: u32, minute: u32 },
}

impl JobSchedule {
    pub fn daily(time: DailyTime) -> Self {
        Self::DailyAt {
            hour: time.hour,
            minute: time.minute,
        }
    }

    /// Time to wait from `now` until the next run.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match *self {
            Self::Every(interval) => interval,
            Self::DailyAt { hour, minute } => {
                let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
                let mut next = now.date_naive().and_time(at).and_utc();
                if next <= now {
                    next += chrono::Duration::days(1);
                }
                (next - now).to_std().unwrap_or(Duration::ZERO)
            }
        }
    }
}

struct Entry {
    job: Arc<dyn Job>,
    schedule: JobSchedule,
    /// Held for the duration of a run
    running: Mutex<()>,
}

impl Entry {
    async fn run_once(&self) -> CoreResult<()> {
        let _guard = self.running.lock().await;
        let started = std::time::Instant::now();
        log::info!("Job '{}' started", self.job.name());

        let result = self.job.run().await;
        match &result {
            Ok(()) => log::info!(
                "Job '{}' finished in {}ms",
                self.job.name(),
                started.elapsed().as_millis()
            ),
            Err(e) => log::error!("Job '{}' failed: {e}", self.job.name()),
        }
        result
    }
}

/// Job registry. Build it, then [`start`](Self::start) it.
#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Arc<Entry>>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. A later job with the same name replaces the earlier one.
    #[must_use]
    pub fn with_job(mut self, job: Arc<dyn Job>, schedule: JobSchedule) -> Self {
        self.entries.retain(|e| e.job.name() != job.name());
        self.entries.push(Arc::new(Entry {
            job,
            schedule,
            running: Mutex::new(()),
        }));
        self
    }

    /// The built-in job set. Auto-renew and the certificate notifier need the certificate service.
    #[must_use]
    pub fn standard(
        ctx: &Arc<ServiceContext>,
        notifier: Arc<dyn Notifier>,
        certificates: Option<CertificateManager>,
    ) -> Self {
        let cfg: &SchedulerConfig = &ctx.config.scheduler;

        let mut scheduler = Self::new()
            .with_job(
                Arc::new(DomainExpiryJob::new(Arc::clone(ctx), Arc::clone(&notifier))),
                JobSchedule::daily(cfg.notify_at),
            )
            .with_job(
                Arc::new(ZoneSyncJob::new(Arc::clone(ctx), SyncService::new(Arc::clone(ctx)))),
                JobSchedule::Every(Duration::from_secs(cfg.zone_sync_interval_secs)),
            )
            .with_job(
                Arc::new(HealthCheckJob::new(ProviderService::new(Arc::clone(ctx)))),
                JobSchedule::Every(Duration::from_secs(cfg.health_check_interval_secs)),
            )
            .with_job(
                Arc::new(ChangeLogCleanupJob::new(Arc::clone(ctx), cfg.change_log_retention_days)),
                JobSchedule::daily(cfg.cleanup_at),
            );

        if let Some(manager) = certificates {
            scheduler = scheduler
                .with_job(
                    Arc::new(CertificateExpiryJob::new(Arc::clone(ctx), notifier)),
                    JobSchedule::daily(cfg.notify_at),
                )
                .with_job(
                    Arc::new(AutoRenewJob::new(Arc::clone(ctx), manager)),
                    JobSchedule::daily(cfg.auto_renew_at),
                );
        }
        scheduler
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// Spawn one loop per job. Must be called inside a tokio runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .entries
            .iter()
            .map(|entry| {
                let entry = Arc::clone(entry);
                let mut shutdown = shutdown_rx.clone();
                log::info!("Scheduling job '{}' ({:?})", entry.job.name(), entry.schedule);

                tokio::spawn(async move {
                    loop {
                        let delay = entry.schedule.next_delay(Utc::now());
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => break,
                        }
                        if *shutdown.borrow() {
                            break;
                        }
                        // 错误已在 run_once 中记录
                        let _ = entry.run_once().await;
                    }
                    log::debug!("Job loop '{}' stopped", entry.job.name());
                })
            })
            .collect();

        SchedulerHandle {
            entries: self.entries,
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Running scheduler.
pub struct SchedulerHandle {
    entries: Vec<Arc<Entry>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Run a job immediately, waiting for any scheduled run of it to finish first.
    pub async fn run_now(&self, name: &str) -> CoreResult<()> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.job.name() == name)
            .ok_or_else(|| CoreError::ValidationError(format!("unknown job '{name}'")))?;
        entry.run_once().await
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// Stop every loop. A run in progress completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                log::error!("Job loop ended abnormally: {e}");
            }
        }
        log::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::test_utils::{RecordingNotifier, TestEnv};

    struct Counting {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> CoreResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn daily_delay_rolls_over() {
        let schedule = JobSchedule::DailyAt { hour: 9, minute: 0 };
        let morning = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(morning), Duration::from_secs(3600));

        let evening = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(evening), Duration::from_secs(23 * 3600));

        let exact = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(exact), Duration::from_secs(24 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_loop_runs_until_shutdown() {
        let job = Arc::new(Counting {
            runs: AtomicUsize::new(0),
        });
        let handle = Scheduler::new()
            .with_job(job.clone(), JobSchedule::Every(Duration::from_secs(10)))
            .start();

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 3);

        handle.run_now("counting").await.unwrap();
        assert_eq!(job.runs.load(Ordering::SeqCst), 4);
        assert!(handle.run_now("missing").await.is_err());

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(job.runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn standard_set_depends_on_certificates() {
        let env = TestEnv::new();
        let notifier = Arc::new(RecordingNotifier::default());

        let without = Scheduler::standard(&env.ctx, notifier.clone(), None);
        assert_eq!(
            without.job_names(),
            vec!["domain_expiry", "zone_sync", "provider_health", "change_log_cleanup"]
        );

        let with = Scheduler::standard(&env.ctx, notifier, Some(env.certificates()));
        assert!(with.job_names().contains(&"certificate_auto_renew"));
        assert!(with.job_names().contains(&"certificate_expiry"));
    }
}
