#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for `SqliteStore`: every repository trait against a
//! throwaway database file.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use zonekeeper_app::adapters::SqliteStore;
use zonekeeper_core::error::CoreError;
use zonekeeper_core::traits::{
    CertificateRepository, ChangeLogRepository, DeploymentRepository, ProviderRepository,
    RecordRepository, ZoneRepository,
};
use zonekeeper_core::types::{
    resource, Actor, CaType, Certificate, CertificateDeployment, CertificatePatch,
    CertificateQuery, CertificateStatus, ChangeAction, ChangeLogEntry, ChangeLogQuery,
    DeploymentStatus, DnsRecordType, HealthStatus, HealthUpdate, KeyType, PageRequest, Provider,
    ProviderStatus, ProviderType, Record, RecordQuery, SyncStatus, Zone, ZoneQuery, ZoneStatus,
};

// ===== Helpers =====

const TENANT: &str = "tenant-a";

async fn create_test_store() -> (SqliteStore, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = tmp.path().join("data").join("test.db");
    let store = SqliteStore::new(&db_path)
        .await
        .expect("failed to create SqliteStore");
    (store, tmp)
}

/// Stored timestamps keep microseconds.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn actor() -> Actor {
    Actor::new("alice", "10.0.0.1", TENANT)
}

fn audit(resource_type: &str, resource_id: &str, action: ChangeAction) -> ChangeLogEntry {
    ChangeLogEntry::new(&actor(), resource_type, resource_id, action)
}

fn make_zone(name: &str) -> Zone {
    let now = now();
    Zone {
        id: new_id(),
        tenant_id: TENANT.to_string(),
        name: name.to_string(),
        status: ZoneStatus::Active,
        registrar_type: Some("namecheap".to_string()),
        provider_id: None,
        expires_at: None,
        auto_renew: false,
        group_id: None,
        remark: None,
        created_by: "alice".to_string(),
        updated_by: "alice".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn make_provider(name: &str, is_default: bool) -> Provider {
    let now = now();
    Provider {
        id: new_id(),
        tenant_id: TENANT.to_string(),
        name: name.to_string(),
        provider_type: ProviderType::Cloudflare,
        credentials_enc: "v2:sealed".to_string(),
        rate_limit: 10,
        concurrency: 5,
        timeout_secs: 30,
        is_default,
        status: ProviderStatus::Active,
        health_status: HealthStatus::Unknown,
        last_checked_at: None,
        last_latency_ms: None,
        last_error: None,
        remark: None,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn make_record(zone: &Zone, name: &str, record_type: DnsRecordType, value: &str) -> Record {
    let now = now();
    Record {
        id: new_id(),
        tenant_id: TENANT.to_string(),
        zone_id: zone.id.clone(),
        provider_id: zone.provider_id.clone(),
        name: name.to_string(),
        record_type,
        value: value.to_string(),
        ttl: 600,
        priority: (record_type == DnsRecordType::Mx).then_some(10),
        weight: None,
        port: None,
        sync_status: SyncStatus::Pending,
        cloud_record_id: None,
        last_sync_at: None,
        remark: None,
        created_by: "alice".to_string(),
        updated_by: "alice".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn make_certificate(common_name: &str, status: CertificateStatus) -> Certificate {
    let now = now();
    Certificate {
        id: new_id(),
        tenant_id: TENANT.to_string(),
        zone_id: Some("zone-1".to_string()),
        provider_id: Some("provider-1".to_string()),
        common_name: common_name.to_string(),
        subject_alt_names: vec![common_name.to_string(), format!("www.{common_name}")],
        ca_type: CaType::LetsEncrypt,
        status,
        key_type: KeyType::Ecdsa256,
        challenge_type: "dns".to_string(),
        email: Some("ops@example.com".to_string()),
        certificate_enc: None,
        private_key_enc: None,
        chain_enc: None,
        csr_pem: None,
        serial_number: None,
        fingerprint: None,
        issued_at: None,
        expires_at: None,
        auto_renew: true,
        renew_days: 30,
        last_renew_at: None,
        renewed_from: None,
        error_message: None,
        remark: None,
        created_by: "alice".to_string(),
        updated_by: "alice".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn make_deployment(certificate_id: &str, host: &str) -> CertificateDeployment {
    let now = now();
    CertificateDeployment {
        id: new_id(),
        certificate_id: certificate_id.to_string(),
        tenant_id: TENANT.to_string(),
        host: host.to_string(),
        deploy_path: "/etc/ssl/certs/".to_string(),
        service_name: "nginx".to_string(),
        status: DeploymentStatus::Pending,
        error_message: None,
        deployed_at: None,
        created_at: now,
        updated_at: now,
    }
}

async fn audit_rows(store: &SqliteStore, resource_id: &str) -> Vec<ChangeLogEntry> {
    let query = ChangeLogQuery {
        tenant_id: TENANT.to_string(),
        resource_id: Some(resource_id.to_string()),
        ..ChangeLogQuery::default()
    };
    ChangeLogRepository::list(store, &query).await.unwrap().0
}

// ===== Zones =====

#[tokio::test]
async fn zone_round_trip_and_audit() {
    let (store, _tmp) = create_test_store().await;
    let mut zone = make_zone("example.com");
    zone.expires_at = Some(now() + Duration::days(90));

    let entry = audit(resource::ZONE, &zone.id, ChangeAction::Create).after(&zone);
    ZoneRepository::insert(&store, &zone, Some(&entry)).await.unwrap();

    let loaded = ZoneRepository::find_by_id(&store, &zone.id).await.unwrap().unwrap();
    assert_eq!(loaded, zone);
    let by_name = ZoneRepository::find_by_name(&store, TENANT, "example.com").await.unwrap();
    assert_eq!(by_name.map(|z| z.id), Some(zone.id.clone()));
    assert!(ZoneRepository::find_by_name(&store, "other-tenant", "example.com")
        .await
        .unwrap()
        .is_none());

    let logs = audit_rows(&store, &zone.id).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, ChangeAction::Create);
    assert_eq!(logs[0].actor_id, "alice");
    assert_eq!(logs[0].after.as_ref().unwrap()["name"], "example.com");
}

#[tokio::test]
async fn zone_name_is_unique_per_tenant() {
    let (store, _tmp) = create_test_store().await;
    ZoneRepository::insert(&store, &make_zone("example.com"), None).await.unwrap();

    let err = ZoneRepository::insert(&store, &make_zone("example.com"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)), "got {err:?}");

    let mut other = make_zone("example.com");
    other.tenant_id = "tenant-b".to_string();
    ZoneRepository::insert(&store, &other, None).await.unwrap();
}

#[tokio::test]
async fn zone_update_and_delete() {
    let (store, _tmp) = create_test_store().await;
    let mut zone = make_zone("example.org");
    ZoneRepository::insert(&store, &zone, None).await.unwrap();

    zone.status = ZoneStatus::Inactive;
    zone.remark = Some("parked".to_string());
    ZoneRepository::update(&store, &zone, None).await.unwrap();
    let loaded = ZoneRepository::find_by_id(&store, &zone.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, ZoneStatus::Inactive);
    assert_eq!(loaded.remark.as_deref(), Some("parked"));

    let entry = audit(resource::ZONE, &zone.id, ChangeAction::Delete).before(&zone);
    ZoneRepository::delete(&store, &zone.id, Some(&entry)).await.unwrap();
    assert!(ZoneRepository::find_by_id(&store, &zone.id).await.unwrap().is_none());
    assert_eq!(audit_rows(&store, &zone.id).await.len(), 1);

    let err = ZoneRepository::delete(&store, &zone.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::ZoneNotFound(_)));
    let err = ZoneRepository::update(&store, &zone, None).await.unwrap_err();
    assert!(matches!(err, CoreError::ZoneNotFound(_)));
}

#[tokio::test]
async fn zone_list_filters_and_pages() {
    let (store, _tmp) = create_test_store().await;
    for name in ["delta.io", "alpha.io", "charlie.net", "bravo.io", "echo.io"] {
        ZoneRepository::insert(&store, &make_zone(name), None).await.unwrap();
    }

    let query = ZoneQuery {
        tenant_id: TENANT.to_string(),
        keyword: Some("IO".to_string()),
        page: PageRequest { page: 1, page_size: 2 },
        ..ZoneQuery::default()
    };
    let (items, total) = ZoneRepository::list(&store, &query).await.unwrap();
    assert_eq!(total, 4);
    let names: Vec<_> = items.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, vec!["alpha.io", "bravo.io"]);

    let second = ZoneQuery {
        page: PageRequest { page: 2, page_size: 2 },
        ..query
    };
    let (items, _) = ZoneRepository::list(&store, &second).await.unwrap();
    let names: Vec<_> = items.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, vec!["delta.io", "echo.io"]);
}

#[tokio::test]
async fn zones_expiring_before_cutoff() {
    let (store, _tmp) = create_test_store().await;
    let mut soon = make_zone("soon.com");
    soon.expires_at = Some(now() + Duration::days(5));
    let mut later = make_zone("later.com");
    later.expires_at = Some(now() + Duration::days(100));
    let never = make_zone("never.com");
    for zone in [&soon, &later, &never] {
        ZoneRepository::insert(&store, zone, None).await.unwrap();
    }

    let expiring = store.list_expiring(now() + Duration::days(30)).await.unwrap();
    let names: Vec<_> = expiring.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, vec!["soon.com"]);
}

// ===== Providers =====

#[tokio::test]
async fn default_provider_is_exclusive() {
    let (store, _tmp) = create_test_store().await;
    let first = make_provider("cf-main", true);
    let second = make_provider("cf-backup", false);
    ProviderRepository::insert(&store, &first, None).await.unwrap();
    ProviderRepository::insert(&store, &second, None).await.unwrap();

    let mut promoted = second.clone();
    promoted.is_default = true;
    ProviderRepository::update(&store, &promoted, None).await.unwrap();

    let providers = ProviderRepository::list(&store, Some(TENANT)).await.unwrap();
    let defaults: Vec<_> = providers
        .iter()
        .filter(|p| p.is_default)
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(defaults, vec!["cf-backup"]);
}

#[tokio::test]
async fn soft_deleted_provider_is_hidden() {
    let (store, _tmp) = create_test_store().await;
    let provider = make_provider("cf", true);
    ProviderRepository::insert(&store, &provider, None).await.unwrap();

    let entry = audit(resource::PROVIDER, &provider.id, ChangeAction::Delete);
    store.soft_delete(&provider.id, now(), Some(&entry)).await.unwrap();

    assert!(ProviderRepository::find_by_name(&store, TENANT, "cf").await.unwrap().is_none());
    assert!(ProviderRepository::list(&store, None).await.unwrap().is_empty());
    assert!(store.list_active().await.unwrap().is_empty());

    let row = ProviderRepository::find_by_id(&store, &provider.id).await.unwrap().unwrap();
    assert!(row.deleted_at.is_some());
    assert!(!row.is_default);
    assert_eq!(audit_rows(&store, &provider.id).await.len(), 1);

    // 同名可以重新创建
    ProviderRepository::insert(&store, &make_provider("cf", false), None).await.unwrap();
}

#[tokio::test]
async fn failed_check_keeps_last_latency() {
    let (store, _tmp) = create_test_store().await;
    let provider = make_provider("cf", false);
    ProviderRepository::insert(&store, &provider, None).await.unwrap();

    let ok = HealthUpdate {
        status: HealthStatus::Healthy,
        checked_at: now(),
        latency_ms: Some(120),
        error: None,
    };
    store.update_health(&provider.id, &ok).await.unwrap();

    let failed = HealthUpdate {
        status: HealthStatus::Unhealthy,
        checked_at: now(),
        latency_ms: None,
        error: Some("401 Unauthorized".to_string()),
    };
    store.update_health(&provider.id, &failed).await.unwrap();

    let row = ProviderRepository::find_by_id(&store, &provider.id).await.unwrap().unwrap();
    assert_eq!(row.health_status, HealthStatus::Unhealthy);
    assert_eq!(row.last_latency_ms, Some(120));
    assert_eq!(row.last_error.as_deref(), Some("401 Unauthorized"));

    store.update_credentials(&provider.id, "v2:rotated").await.unwrap();
    let row = ProviderRepository::find_by_id(&store, &provider.id).await.unwrap().unwrap();
    assert_eq!(row.credentials_enc, "v2:rotated");

    let err = store.update_credentials("missing", "x").await.unwrap_err();
    assert!(matches!(err, CoreError::ProviderNotFound(_)));
}

// ===== Records =====

#[tokio::test]
async fn record_key_is_unique_per_zone() {
    let (store, _tmp) = create_test_store().await;
    let zone = make_zone("example.com");
    ZoneRepository::insert(&store, &zone, None).await.unwrap();

    let www = make_record(&zone, "www", DnsRecordType::A, "1.1.1.1");
    RecordRepository::insert(&store, &www, None).await.unwrap();

    let dup = make_record(&zone, "www", DnsRecordType::A, "2.2.2.2");
    let err = RecordRepository::insert(&store, &dup, None).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)), "got {err:?}");

    // 同名不同类型不冲突
    let aaaa = make_record(&zone, "www", DnsRecordType::Aaaa, "2001:db8::1");
    RecordRepository::insert(&store, &aaaa, None).await.unwrap();

    let found = store.find_by_key(&zone.id, "www", DnsRecordType::A).await.unwrap().unwrap();
    assert_eq!(found, www);
    assert_eq!(store.count_by_zone(&zone.id).await.unwrap(), 2);
}

#[tokio::test]
async fn record_listing_and_filters() {
    let (store, _tmp) = create_test_store().await;
    let zone = make_zone("example.com");
    ZoneRepository::insert(&store, &zone, None).await.unwrap();
    for (name, rtype, value) in [
        ("www", DnsRecordType::Cname, "lb.example.net"),
        ("@", DnsRecordType::Mx, "mail.example.com"),
        ("api", DnsRecordType::A, "10.0.0.8"),
        ("api", DnsRecordType::Txt, "v=spf1 -all"),
    ] {
        RecordRepository::insert(&store, &make_record(&zone, name, rtype, value), None)
            .await
            .unwrap();
    }

    let all = store.list_by_zone(&zone.id).await.unwrap();
    let keys: Vec<_> = all.iter().map(|r| (r.name.as_str(), r.record_type)).collect();
    assert_eq!(
        keys,
        vec![
            ("@", DnsRecordType::Mx),
            ("api", DnsRecordType::A),
            ("api", DnsRecordType::Txt),
            ("www", DnsRecordType::Cname),
        ]
    );
    assert_eq!(all[0].priority, Some(10));

    let by_value = RecordQuery {
        tenant_id: TENANT.to_string(),
        keyword: Some("example".to_string()),
        ..RecordQuery::default()
    };
    let (_, total) = RecordRepository::list(&store, &by_value).await.unwrap();
    assert_eq!(total, 2);

    let by_type = RecordQuery {
        tenant_id: TENANT.to_string(),
        zone_id: Some(zone.id.clone()),
        record_type: Some(DnsRecordType::Txt),
        ..RecordQuery::default()
    };
    let (items, total) = RecordRepository::list(&store, &by_type).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].value, "v=spf1 -all");
}

#[tokio::test]
async fn mark_synced_keeps_cloud_id_when_absent() {
    let (store, _tmp) = create_test_store().await;
    let zone = make_zone("example.com");
    ZoneRepository::insert(&store, &zone, None).await.unwrap();
    let record = make_record(&zone, "www", DnsRecordType::A, "1.1.1.1");
    RecordRepository::insert(&store, &record, None).await.unwrap();

    store
        .mark_synced(&record.id, Some("cf-123"), SyncStatus::Synced, now())
        .await
        .unwrap();
    store
        .mark_synced(&record.id, None, SyncStatus::Error, now())
        .await
        .unwrap();

    let row = RecordRepository::find_by_id(&store, &record.id).await.unwrap().unwrap();
    assert_eq!(row.cloud_record_id.as_deref(), Some("cf-123"));
    assert_eq!(row.sync_status, SyncStatus::Error);
    assert!(row.last_sync_at.is_some());

    let entry = audit(resource::RECORD, &record.id, ChangeAction::Delete);
    RecordRepository::delete(&store, &record.id, Some(&entry)).await.unwrap();
    let err = RecordRepository::delete(&store, &record.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::RecordNotFound(_)));
}

#[tokio::test]
async fn update_leaves_cloud_id_to_mark_synced() {
    let (store, _tmp) = create_test_store().await;
    let zone = make_zone("example.com");
    ZoneRepository::insert(&store, &zone, None).await.unwrap();
    let record = make_record(&zone, "www", DnsRecordType::A, "1.1.1.1");
    RecordRepository::insert(&store, &record, None).await.unwrap();

    // 推送先写回 cloud id，随后用旧快照更新
    store
        .mark_synced(&record.id, Some("cf-9"), SyncStatus::Synced, now())
        .await
        .unwrap();
    let stale = Record {
        value: "2.2.2.2".to_string(),
        sync_status: SyncStatus::Pending,
        ..record.clone()
    };
    RecordRepository::update(&store, &stale, None).await.unwrap();

    let row = RecordRepository::find_by_id(&store, &record.id).await.unwrap().unwrap();
    assert_eq!(row.value, "2.2.2.2");
    assert_eq!(row.sync_status, SyncStatus::Pending);
    assert_eq!(row.cloud_record_id.as_deref(), Some("cf-9"));
    assert!(row.last_sync_at.is_some());
}

// ===== Certificates =====

#[tokio::test]
async fn certificate_transition_is_compare_and_set() {
    let (store, _tmp) = create_test_store().await;
    let cert = make_certificate("example.com", CertificateStatus::Pending);
    CertificateRepository::insert(&store, &cert, None).await.unwrap();

    let applied = store
        .transition(
            &cert.id,
            CertificateStatus::Pending,
            CertificateStatus::Processing,
            &CertificatePatch::default(),
            None,
        )
        .await
        .unwrap();
    assert!(applied);

    // 第二个竞争者看到的已不是 pending
    let applied = store
        .transition(
            &cert.id,
            CertificateStatus::Pending,
            CertificateStatus::Processing,
            &CertificatePatch::default(),
            None,
        )
        .await
        .unwrap();
    assert!(!applied);

    let expires = now() + Duration::days(90);
    let patch = CertificatePatch {
        certificate_enc: Some("v2:cert".to_string()),
        serial_number: Some("0a1b".to_string()),
        issued_at: Some(now()),
        expires_at: Some(expires),
        ..CertificatePatch::default()
    };
    let entry = audit(resource::CERTIFICATE, &cert.id, ChangeAction::Issue);
    let applied = store
        .transition(
            &cert.id,
            CertificateStatus::Processing,
            CertificateStatus::Issued,
            &patch,
            Some(&entry),
        )
        .await
        .unwrap();
    assert!(applied);

    let row = CertificateRepository::find_by_id(&store, &cert.id).await.unwrap().unwrap();
    assert_eq!(row.status, CertificateStatus::Issued);
    assert_eq!(row.certificate_enc.as_deref(), Some("v2:cert"));
    assert_eq!(row.serial_number.as_deref(), Some("0a1b"));
    assert_eq!(row.expires_at, Some(expires));
    assert_eq!(row.subject_alt_names, cert.subject_alt_names);
    assert_eq!(audit_rows(&store, &cert.id).await.len(), 1);

    let missing = store
        .transition(
            "nope",
            CertificateStatus::Issued,
            CertificateStatus::Revoked,
            &CertificatePatch::default(),
            None,
        )
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn failed_transition_records_error_message() {
    let (store, _tmp) = create_test_store().await;
    let cert = make_certificate("example.com", CertificateStatus::Processing);
    CertificateRepository::insert(&store, &cert, None).await.unwrap();

    store
        .transition(
            &cert.id,
            CertificateStatus::Processing,
            CertificateStatus::Failed,
            &CertificatePatch::error("DNS-01 challenge timed out"),
            None,
        )
        .await
        .unwrap();

    let row = CertificateRepository::find_by_id(&store, &cert.id).await.unwrap().unwrap();
    assert_eq!(row.status, CertificateStatus::Failed);
    assert_eq!(row.error_message.as_deref(), Some("DNS-01 challenge timed out"));
}

#[tokio::test]
async fn certificate_queries() {
    let (store, _tmp) = create_test_store().await;
    let issued = make_certificate("shop.example.com", CertificateStatus::Issued);
    let mut uploaded = make_certificate("legacy.example.com", CertificateStatus::Issued);
    uploaded.ca_type = CaType::Uploaded;
    uploaded.auto_renew = false;
    let pending = make_certificate("new.example.org", CertificateStatus::Pending);
    for cert in [&issued, &uploaded, &pending] {
        CertificateRepository::insert(&store, cert, None).await.unwrap();
    }

    let query = CertificateQuery {
        tenant_id: TENANT.to_string(),
        keyword: Some("example.com".to_string()),
        auto_renew: Some(true),
        ..CertificateQuery::default()
    };
    let (items, total) = CertificateRepository::list(&store, &query).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(items[0].id, issued.id);

    let by_ca = CertificateQuery {
        tenant_id: TENANT.to_string(),
        ca_type: Some(CaType::Uploaded),
        ..CertificateQuery::default()
    };
    assert_eq!(CertificateRepository::list(&store, &by_ca).await.unwrap().1, 1);

    let issued_rows = store.list_by_status(CertificateStatus::Issued).await.unwrap();
    assert_eq!(issued_rows.len(), 2);

    let picked = store
        .list_by_ids(&[pending.id.clone(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(picked.len(), 1);
    assert!(store.list_by_ids(&[]).await.unwrap().is_empty());

    assert_eq!(store.list_for_tenant(TENANT).await.unwrap().len(), 3);
    assert!(store.list_for_tenant("tenant-b").await.unwrap().is_empty());

    CertificateRepository::delete(&store, &pending.id, None).await.unwrap();
    let err = CertificateRepository::delete(&store, &pending.id, None).await.unwrap_err();
    assert!(matches!(err, CoreError::CertificateNotFound(_)));
}

// ===== Deployments =====

#[tokio::test]
async fn deployment_terminal_rows_are_immutable() {
    let (store, _tmp) = create_test_store().await;
    let cert = make_certificate("example.com", CertificateStatus::Issued);
    CertificateRepository::insert(&store, &cert, None).await.unwrap();

    let web1 = make_deployment(&cert.id, "web-1");
    let web2 = make_deployment(&cert.id, "web-2");
    let entry = audit(resource::CERTIFICATE, &cert.id, ChangeAction::Deploy);
    store
        .insert_batch(&[web1.clone(), web2.clone()], Some(&entry))
        .await
        .unwrap();
    assert_eq!(audit_rows(&store, &cert.id).await.len(), 1);

    let done_at = now();
    store
        .update_status(&web1.id, DeploymentStatus::Success, None, Some(done_at))
        .await
        .unwrap();
    // 已终态，忽略
    store
        .update_status(&web1.id, DeploymentStatus::Failed, Some("late failure"), None)
        .await
        .unwrap();
    store
        .update_status(&web2.id, DeploymentStatus::Failed, Some("connection refused"), None)
        .await
        .unwrap();

    let row1 = DeploymentRepository::find_by_id(&store, &web1.id).await.unwrap().unwrap();
    assert_eq!(row1.status, DeploymentStatus::Success);
    assert_eq!(row1.deployed_at, Some(done_at));
    assert_eq!(row1.error_message, None);

    let row2 = DeploymentRepository::find_by_id(&store, &web2.id).await.unwrap().unwrap();
    assert_eq!(row2.status, DeploymentStatus::Failed);
    assert_eq!(row2.error_message.as_deref(), Some("connection refused"));

    assert_eq!(store.list_by_certificate(&cert.id).await.unwrap().len(), 2);
    assert_eq!(store.delete_by_certificate(&cert.id).await.unwrap(), 2);
    assert!(store.list_by_certificate(&cert.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deployment_batch_is_all_or_nothing() {
    let (store, _tmp) = create_test_store().await;
    let cert = make_certificate("example.com", CertificateStatus::Issued);
    CertificateRepository::insert(&store, &cert, None).await.unwrap();

    let web1 = make_deployment(&cert.id, "web-1");
    let mut clash = make_deployment(&cert.id, "web-2");
    clash.id.clone_from(&web1.id);

    let entry = audit(resource::CERTIFICATE, &cert.id, ChangeAction::Deploy);
    store
        .insert_batch(&[web1, clash], Some(&entry))
        .await
        .unwrap_err();

    assert!(store.list_by_certificate(&cert.id).await.unwrap().is_empty());
    assert!(audit_rows(&store, &cert.id).await.is_empty());
}

// ===== Change log =====

#[tokio::test]
async fn change_log_filters_and_purge() {
    let (store, _tmp) = create_test_store().await;

    let mut old = audit(resource::ZONE, "z1", ChangeAction::Create);
    old.created_at = now() - Duration::days(120);
    let recent = audit(resource::ZONE, "z1", ChangeAction::Update);
    let other = audit(resource::RECORD, "r1", ChangeAction::Sync);
    for entry in [&old, &recent, &other] {
        store.append(entry).await.unwrap();
    }

    let zone_logs = ChangeLogQuery {
        tenant_id: TENANT.to_string(),
        resource_type: Some(resource::ZONE.to_string()),
        ..ChangeLogQuery::default()
    };
    let (items, total) = ChangeLogRepository::list(&store, &zone_logs).await.unwrap();
    assert_eq!(total, 2);
    // 新的在前
    assert_eq!(items[0].id, recent.id);

    let removed = store.delete_older_than(now() - Duration::days(90)).await.unwrap();
    assert_eq!(removed, 1);
    let (_, total) = ChangeLogRepository::list(&store, &zone_logs).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn failed_audit_write_keeps_the_mutation() {
    let (store, _tmp) = create_test_store().await;
    let zone = make_zone("example.com");

    // 同 id 的审计行已存在，插入会触发主键冲突
    let entry = audit(resource::ZONE, &zone.id, ChangeAction::Create);
    store.append(&entry).await.unwrap();

    ZoneRepository::insert(&store, &zone, Some(&entry)).await.unwrap();

    assert!(ZoneRepository::find_by_id(&store, &zone.id).await.unwrap().is_some());
    assert_eq!(audit_rows(&store, &zone.id).await.len(), 1);
}

#[tokio::test]
async fn reopening_keeps_data() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("zonekeeper.db");
    let zone = make_zone("persist.dev");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        ZoneRepository::insert(&store, &zone, None).await.unwrap();
    }

    let store = SqliteStore::new(&db_path).await.unwrap();
    let loaded = ZoneRepository::find_by_id(&store, &zone.id).await.unwrap();
    assert_eq!(loaded, Some(zone));
}
