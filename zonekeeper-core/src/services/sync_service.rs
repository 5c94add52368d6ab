//! 记录对账服务
//!
//! 本地记录是期望状态：本地独有 → 创建，远端独有 → 删除，两边都有但内容不同 → 更新。
//! 每个 `(name, type)` 只取第一条，轮询式多值记录视为一个逻辑条目。

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use zonekeeper_provider::{
    with_deadline, DnsProvider, DnsRecord, DnsRecordType, RecordFilter, RecordKey,
};

use crate::error::{CoreError, CoreResult};
use crate::services::{log_core_error, ServiceContext};
use crate::types::{
    resource, Actor, ApplyOutcome, BatchOutcome, ChangeAction, ChangeLogEntry, ChangeStatus,
    Provider, Record, RecordUpdate, SyncDiff, SyncItemError, SyncOptions, SyncRequest,
    SyncResult, SyncStatus, Zone,
};
use crate::utils::elapsed_ms;

type RecordIdentity = (String, DnsRecordType);

// ============ Diff ============

/// Three-way diff of local desired records against the provider's records.
///
/// Pure: no I/O. Apex `NS` records are provider-managed and never compared.
pub fn compare_records(local: &[Record], remote: &[DnsRecord], options: &SyncOptions) -> SyncDiff {
    let excluded: HashSet<String> = options
        .exclude_names
        .iter()
        .map(String::as_str)
        .map(normalize_name)
        .collect();
    let in_scope = |name: &str, record_type: DnsRecordType| {
        !(name == "@" && record_type == DnsRecordType::Ns)
            && !excluded.contains(name)
            && (options.record_types.is_empty() || options.record_types.contains(&record_type))
    };

    let mut remote_by_key: HashMap<RecordIdentity, &DnsRecord> = HashMap::new();
    let mut remote_order: Vec<RecordIdentity> = Vec::new();
    for record in remote {
        let key = (normalize_name(&record.name), record.data.record_type());
        if !in_scope(&key.0, key.1) || remote_by_key.contains_key(&key) {
            continue;
        }
        remote_order.push(key.clone());
        remote_by_key.insert(key, record);
    }

    let mut diff = SyncDiff::default();
    let mut seen_local: HashSet<RecordIdentity> = HashSet::new();
    for record in local {
        let key = (normalize_name(&record.name), record.record_type);
        if !in_scope(&key.0, key.1) || !seen_local.insert(key.clone()) {
            continue;
        }
        match remote_by_key.get(&key) {
            None => diff.to_add.push(record.clone()),
            Some(remote) if !same_content(record, remote) => diff.to_update.push(RecordUpdate {
                local: record.clone(),
                remote: (*remote).clone(),
            }),
            Some(remote) => {
                let linked = record.cloud_record_id.as_deref() == Some(remote.id.as_str());
                if !linked || record.sync_status != SyncStatus::Synced {
                    diff.to_relink.push((record.clone(), remote.id.clone()));
                }
            }
        }
    }

    diff.to_delete = remote_order
        .into_iter()
        .filter(|key| !seen_local.contains(key))
        .filter_map(|key| remote_by_key.get(&key).map(|r| (*r).clone()))
        .collect();
    diff
}

fn normalize_name(name: &str) -> String {
    let name = name.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() {
        "@".to_string()
    } else {
        name
    }
}

/// Value as compared: IPs canonicalized, host names case- and dot-insensitive,
/// TXT without surrounding quotes.
fn normalize_value(record_type: DnsRecordType, value: &str) -> String {
    let value = value.trim();
    match record_type {
        DnsRecordType::A | DnsRecordType::Aaaa => value
            .parse::<IpAddr>()
            .map_or_else(|_| value.to_string(), |ip| ip.to_string()),
        DnsRecordType::Cname
        | DnsRecordType::Mx
        | DnsRecordType::Ns
        | DnsRecordType::Ptr
        | DnsRecordType::Srv => value.trim_end_matches('.').to_ascii_lowercase(),
        DnsRecordType::Txt => value.trim_matches('"').to_string(),
        DnsRecordType::Caa => value.to_string(),
    }
}

fn same_content(local: &Record, remote: &DnsRecord) -> bool {
    let record_type = local.record_type;
    normalize_value(record_type, &local.value) == normalize_value(record_type, &remote.data.value())
        && local.ttl == remote.ttl
        && local.priority == remote.data.priority()
        && local.weight == remote.data.weight()
        && local.port == remote.data.port()
}

// ============ Service ============

/// 记录对账服务
pub struct SyncService {
    ctx: Arc<ServiceContext>,
}

impl SyncService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Fetch both sides and diff them.
    pub async fn compare(
        &self,
        zone: &Zone,
        provider: &Provider,
        options: &SyncOptions,
    ) -> CoreResult<(SyncDiff, usize, usize)> {
        let local = self.ctx.repos.records.list_by_zone(&zone.id).await?;
        let driver = self.ctx.provider_driver(provider).await?;
        let remote = match with_deadline(
            driver.id(),
            self.ctx.request_timeout(provider),
            driver.list_records(&zone.name, &RecordFilter::default()),
        )
        .await
        {
            Ok(records) => records,
            Err(e) => return Err(self.ctx.handle_provider_error(&provider.id, e).await),
        };

        let diff = compare_records(&local, &remote, options);
        Ok((diff, local.len(), remote.len()))
    }

    /// Execute a diff. `dry_run` touches neither the store nor the provider and
    /// reports the counts a real run would produce.
    pub async fn apply(
        &self,
        zone: &Zone,
        provider: &Provider,
        diff: SyncDiff,
        dry_run: bool,
    ) -> CoreResult<ApplyOutcome> {
        if dry_run {
            return Ok(ApplyOutcome {
                added: diff.to_add.len(),
                updated: diff.to_update.len(),
                deleted: diff.to_delete.len(),
                errors: Vec::new(),
            });
        }

        let driver = self.ctx.provider_driver(provider).await?;
        let concurrency = usize::try_from(provider.concurrency.max(1)).unwrap_or(1);
        let applier = Applier {
            ctx: &self.ctx,
            driver: driver.as_ref(),
            zone: &zone.name,
            provider,
        };

        let mut ops: Vec<SyncOp> = Vec::new();
        ops.extend(diff.to_add.into_iter().map(SyncOp::Add));
        ops.extend(diff.to_update.into_iter().map(SyncOp::Update));
        ops.extend(diff.to_delete.into_iter().map(SyncOp::Delete));

        let results: Vec<(SyncOpKind, Result<(), SyncItemError>)> = stream::iter(ops)
            .map(|op| applier.run(op))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut outcome = ApplyOutcome::default();
        for (kind, result) in results {
            match result {
                Ok(()) => match kind {
                    SyncOpKind::Add => outcome.added += 1,
                    SyncOpKind::Update => outcome.updated += 1,
                    SyncOpKind::Delete => outcome.deleted += 1,
                },
                Err(e) => outcome.errors.push(e),
            }
        }

        for (record, cloud_id) in diff.to_relink {
            if let Err(e) = self
                .ctx
                .repos
                .records
                .mark_synced(&record.id, Some(&cloud_id), SyncStatus::Synced, Utc::now())
                .await
            {
                log::warn!("Failed to relink record {} to {cloud_id}: {e}", record.id);
            }
        }

        Ok(outcome)
    }

    /// Reconcile one zone against its provider.
    pub async fn sync(&self, request: SyncRequest) -> CoreResult<SyncResult> {
        self.sync_with(request, &SyncOptions::default()).await
    }

    /// [`sync`](Self::sync) with a narrowed key space. `request.dry_run` wins over `options.dry_run`.
    pub async fn sync_with(
        &self,
        request: SyncRequest,
        options: &SyncOptions,
    ) -> CoreResult<SyncResult> {
        let started = Instant::now();
        let actor = &request.actor;
        let dry_run = request.dry_run || options.dry_run;
        let zone = self.ctx.get_zone(&request.zone_id, &actor.tenant_id).await?;
        let provider_id = request
            .provider_id
            .clone()
            .or_else(|| zone.provider_id.clone())
            .ok_or_else(|| {
                CoreError::ValidationError(format!("zone {} has no linked provider", zone.name))
            })?;
        let provider = self.ctx.get_provider(&provider_id, Some(&actor.tenant_id)).await?;

        let (diff, total_local, total_remote) = match self.compare(&zone, &provider, options).await {
            Ok(compared) => compared,
            Err(e) => {
                if !dry_run {
                    let entry =
                        ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Sync)
                            .status(ChangeStatus::Failed)
                            .describe(format!("sync with {} failed: {e}", provider.name));
                    self.ctx.audit(&entry).await;
                }
                return Err(e);
            }
        };
        let (to_add, to_update, to_delete) =
            (diff.to_add.len(), diff.to_update.len(), diff.to_delete.len());

        let outcome = self.apply(&zone, &provider, diff, dry_run).await?;
        let result = SyncResult {
            zone_name: zone.name.clone(),
            provider: provider.name.clone(),
            total_local,
            total_remote,
            to_add,
            to_update,
            to_delete,
            added: outcome.added,
            updated: outcome.updated,
            deleted: outcome.deleted,
            error_count: outcome.errors.len(),
            errors: outcome.errors,
            dry_run,
            duration_ms: elapsed_ms(started),
        };

        if !dry_run {
            let status = if result.error_count == 0 {
                ChangeStatus::Success
            } else {
                ChangeStatus::PartialSuccess
            };
            let entry = ChangeLogEntry::new(actor, resource::ZONE, &zone.id, ChangeAction::Sync)
                .after(&result)
                .status(status)
                .describe(format!(
                    "+{} ~{} -{} ({} errors)",
                    result.added, result.updated, result.deleted, result.error_count
                ));
            self.ctx.audit(&entry).await;
        }

        log::info!(
            "Synced zone {} with {}: +{} ~{} -{}, {} errors, dry_run={}, {}ms",
            result.zone_name,
            result.provider,
            result.added,
            result.updated,
            result.deleted,
            result.error_count,
            result.dry_run,
            result.duration_ms
        );
        Ok(result)
    }

    /// Reconcile every zone linked to a provider. One failing zone does not stop the rest.
    pub async fn sync_provider_zones(&self, provider: &Provider) -> CoreResult<BatchOutcome> {
        let zones = self.ctx.repos.zones.list_by_provider(&provider.id).await?;
        let mut outcome = BatchOutcome::default();

        for zone in zones {
            let request = SyncRequest {
                zone_id: zone.id.clone(),
                provider_id: Some(provider.id.clone()),
                dry_run: false,
                actor: Actor::system(&zone.tenant_id),
            };
            match self.sync(request).await {
                Ok(result) if result.error_count == 0 => outcome.record_success(),
                Ok(result) => outcome.record_failure(
                    &zone.id,
                    format!("{} record operations failed", result.error_count),
                ),
                Err(e) => {
                    log_core_error(&format!("Sync of zone {} failed", zone.name), &e);
                    outcome.record_failure(&zone.id, e);
                }
            }
        }
        Ok(outcome)
    }
}

// ============ Apply ============

#[derive(Clone, Copy)]
enum SyncOpKind {
    Add,
    Update,
    Delete,
}

enum SyncOp {
    Add(Record),
    Update(RecordUpdate),
    Delete(DnsRecord),
}

struct Applier<'a> {
    ctx: &'a ServiceContext,
    driver: &'a dyn DnsProvider,
    zone: &'a str,
    provider: &'a Provider,
}

impl Applier<'_> {
    async fn run(&self, op: SyncOp) -> (SyncOpKind, Result<(), SyncItemError>) {
        match op {
            SyncOp::Add(record) => {
                let result = self.push(&record, None).await;
                (
                    SyncOpKind::Add,
                    result.map_err(|e| item_error("add", &record.name, record.record_type, &e)),
                )
            }
            SyncOp::Update(update) => {
                let local = &update.local;
                let result = self.push(local, Some(&update.remote.id)).await;
                (
                    SyncOpKind::Update,
                    result.map_err(|e| item_error("update", &local.name, local.record_type, &e)),
                )
            }
            SyncOp::Delete(remote) => {
                let record_type = remote.data.record_type();
                let key = RecordKey::from_cloud_id(Some(&remote.id), &remote.name, record_type);
                let result = self.call(self.driver.delete_record(self.zone, &key)).await;
                (
                    SyncOpKind::Delete,
                    result.map_err(|e| item_error("delete", &remote.name, record_type, &e)),
                )
            }
        }
    }

    /// Create (or update `cloud_id`) at the provider, then persist the returned id.
    ///
    /// A failed push leaves the local record flagged `error`.
    async fn push(&self, record: &Record, cloud_id: Option<&str>) -> CoreResult<()> {
        // 与记录服务的后台推送互斥
        let _push = self.ctx.record_pushes.lock(&record.id).await;
        let result = self.push_locked(record, cloud_id).await;
        if result.is_err() {
            if let Err(e) = self
                .ctx
                .repos
                .records
                .mark_synced(&record.id, None, SyncStatus::Error, Utc::now())
                .await
            {
                log::error!("Failed to flag record {} as error: {e}", record.id);
            }
        }
        result
    }

    async fn push_locked(&self, record: &Record, cloud_id: Option<&str>) -> CoreResult<()> {
        let spec = record.spec()?;
        // 等锁期间后台推送可能已经建好了远端记录
        let stored_id = match cloud_id {
            Some(_) => None,
            None => self
                .ctx
                .repos
                .records
                .find_by_id(&record.id)
                .await?
                .and_then(|r| r.cloud_record_id),
        };
        let remote = match cloud_id.or(stored_id.as_deref()) {
            Some(id) => self.call(self.driver.update_record(self.zone, id, &spec)).await?,
            None => self.call(self.driver.create_record(self.zone, &spec)).await?,
        };
        self.ctx
            .repos
            .records
            .mark_synced(&record.id, Some(&remote.id), SyncStatus::Synced, Utc::now())
            .await
    }

    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = zonekeeper_provider::Result<T>>,
    ) -> CoreResult<T> {
        match with_deadline(self.driver.id(), self.ctx.request_timeout(self.provider), fut).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.ctx.handle_provider_error(&self.provider.id, e).await),
        }
    }
}

fn item_error(
    operation: &str,
    name: &str,
    record_type: DnsRecordType,
    err: &CoreError,
) -> SyncItemError {
    log_core_error(&format!("Sync {operation} {name} {record_type} failed"), err);
    SyncItemError {
        operation: operation.to_string(),
        name: name.to_string(),
        record_type,
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{local_record, remote_record, TestEnv};
    use zonekeeper_provider::{ProviderError, RecordData};

    #[test]
    fn local_only_key_is_added() {
        let local = vec![local_record("www", DnsRecordType::A, "1.1.1.1", 300)];
        let diff = compare_records(&local, &[], &SyncOptions::default());
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].value, "1.1.1.1");
        assert!(diff.to_update.is_empty() && diff.to_delete.is_empty());
    }

    #[test]
    fn changed_value_is_updated_with_both_sides() {
        let local = vec![local_record("www", DnsRecordType::A, "1.1.1.1", 300)];
        let remote = vec![remote_record("r1", "www", RecordData::A { address: "2.2.2.2".into() }, 300)];
        let diff = compare_records(&local, &remote, &SyncOptions::default());
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].local.value, "1.1.1.1");
        assert_eq!(diff.to_update[0].remote.data.value(), "2.2.2.2");
        assert!(diff.to_add.is_empty() && diff.to_delete.is_empty());
    }

    #[test]
    fn remote_only_key_is_deleted() {
        let remote = vec![remote_record(
            "r1",
            "old",
            RecordData::CNAME { target: "foo.com".into() },
            600,
        )];
        let diff = compare_records(&[], &remote, &SyncOptions::default());
        assert_eq!(diff.to_delete.len(), 1);
        assert_eq!(diff.to_delete[0].name, "old");
    }

    #[test]
    fn equal_content_ignores_cosmetics_and_relinks() {
        let cname = local_record("API", DnsRecordType::Cname, "Target.Example.com.", 600);
        let local = vec![cname, local_record("@", DnsRecordType::Txt, "v=spf1 -all", 600)];
        let remote = vec![
            remote_record("r1", "api", RecordData::CNAME { target: "target.example.com".into() }, 600),
            remote_record("r2", "@", RecordData::TXT { text: "\"v=spf1 -all\"".into() }, 600),
            remote_record("r3", "@", RecordData::NS { nameserver: "ns1.provider.net".into() }, 86_400),
        ];
        let diff = compare_records(&local, &remote, &SyncOptions::default());
        assert!(diff.is_empty(), "{diff:?}");
        assert_eq!(diff.to_relink.len(), 2);
        assert_eq!(diff.to_relink[0].1, "r1");
    }

    #[test]
    fn options_narrow_key_space() {
        let local = vec![
            local_record("www", DnsRecordType::A, "1.1.1.1", 300),
            local_record("mail", DnsRecordType::Txt, "hello", 300),
        ];
        let options = SyncOptions {
            dry_run: false,
            record_types: vec![DnsRecordType::A],
            exclude_names: vec!["WWW.".into()],
        };
        assert!(compare_records(&local, &[], &options).is_empty());
    }

    #[test]
    fn first_value_per_key_wins() {
        let remote = vec![
            remote_record("r1", "www", RecordData::A { address: "1.1.1.1".into() }, 300),
            remote_record("r2", "www", RecordData::A { address: "2.2.2.2".into() }, 300),
        ];
        let local = vec![local_record("www", DnsRecordType::A, "1.1.1.1", 300)];
        let diff = compare_records(&local, &remote, &SyncOptions::default());
        assert!(diff.is_empty());
    }

    #[tokio::test]
    async fn dry_run_is_pure_and_counts_match() {
        let env = TestEnv::new();
        let provider = env.seed_provider("cf").await;
        let zone = env.seed_zone("example.com", Some(&provider.id)).await;
        env.seed_record(&zone, "www", DnsRecordType::A, "1.1.1.1").await;
        env.seed_record(&zone, "api", DnsRecordType::A, "3.3.3.3").await;
        env.mock.add_zone("example.com");
        env.mock.insert_record("example.com", "api", RecordData::A { address: "4.4.4.4".into() }, 600);
        env.mock.insert_record("example.com", "old", RecordData::CNAME { target: "foo.com".into() }, 600);
        let service = SyncService::new(env.ctx.clone());

        let before_records = env.ctx.repos.records.list_by_zone(&zone.id).await.unwrap();
        let request = |dry_run| SyncRequest {
            zone_id: zone.id.clone(),
            provider_id: None,
            dry_run,
            actor: env.actor(),
        };

        let calls_before = env.mock.call_count();
        let preview = service.sync(request(true)).await.unwrap();
        // 只允许一次 list_records
        assert_eq!(env.mock.call_count(), calls_before + 1);
        assert_eq!(env.ctx.repos.records.list_by_zone(&zone.id).await.unwrap(), before_records);
        assert!(env.store.audit_entries().iter().all(|e| e.action != ChangeAction::Sync));
        assert_eq!((preview.to_add, preview.to_update, preview.to_delete), (1, 1, 1));

        let real = service.sync(request(false)).await.unwrap();
        assert_eq!(
            (real.added, real.updated, real.deleted),
            (preview.added, preview.updated, preview.deleted)
        );
        assert_eq!(real.error_count, 0);

        // 再次对比应为不动点
        let again = service.sync(request(true)).await.unwrap();
        assert_eq!((again.to_add, again.to_update, again.to_delete), (0, 0, 0));

        let synced = env.ctx.repos.records.list_by_zone(&zone.id).await.unwrap();
        assert!(synced.iter().all(|r| r.sync_status == SyncStatus::Synced));
        assert!(synced.iter().all(|r| r.cloud_record_id.is_some()));

        let audit = env
            .store
            .audit_entries()
            .into_iter()
            .find(|e| e.action == ChangeAction::Sync)
            .unwrap();
        assert_eq!(audit.status, ChangeStatus::Success);
    }

    #[tokio::test]
    async fn item_failures_are_collected() {
        let env = TestEnv::new();
        let provider = env.seed_provider("cf").await;
        let zone = env.seed_zone("example.com", Some(&provider.id)).await;
        env.seed_record(&zone, "www", DnsRecordType::A, "1.1.1.1").await;
        env.seed_record(&zone, "bad", DnsRecordType::A, "9.9.9.9").await;
        env.mock.add_zone("example.com");
        env.mock.fail_create_for(
            "bad",
            ProviderError::InvalidParameter {
                provider: "mock".into(),
                param: "value".into(),
                detail: "rejected".into(),
            },
        );
        let service = SyncService::new(env.ctx.clone());

        let result = service
            .sync(SyncRequest {
                zone_id: zone.id.clone(),
                provider_id: None,
                dry_run: false,
                actor: env.actor(),
            })
            .await
            .unwrap();
        assert_eq!(result.added, 1);
        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors[0].name, "bad");
        assert_eq!(result.errors[0].operation, "add");

        // 失败的记录标记为 error，成功的照常 synced
        let stored = env.ctx.repos.records.list_by_zone(&zone.id).await.unwrap();
        let status = |name: &str| {
            stored
                .iter()
                .find(|r| r.name == name)
                .map(|r| (r.sync_status, r.cloud_record_id.is_some()))
                .unwrap()
        };
        assert_eq!(status("bad"), (SyncStatus::Error, false));
        assert_eq!(status("www"), (SyncStatus::Synced, true));

        let audit = env
            .store
            .audit_entries()
            .into_iter()
            .find(|e| e.action == ChangeAction::Sync)
            .unwrap();
        assert_eq!(audit.status, ChangeStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn zone_without_provider_is_rejected() {
        let env = TestEnv::new();
        let zone = env.seed_zone("example.com", None).await;
        let service = SyncService::new(env.ctx.clone());
        let err = service
            .sync(SyncRequest {
                zone_id: zone.id,
                provider_id: None,
                dry_run: true,
                actor: env.actor(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
