//! 证书生命周期管理
//!
//! 状态机：`pending → processing → issued → {renewed | revoked | renew_failed}`，
//! 首次签发失败落在 `failed`。所有状态写入都经过
//! [`CertificateRepository::transition`](crate::traits::CertificateRepository::transition) 的比较交换。

mod batch;
mod deployment;
pub mod download;
mod lifecycle;
pub mod material;

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::acme::{CertificateIssuer, IssuedBundle, PropagationChecker};
use super::ServiceContext;
use crate::crypto::CredentialVault;
use crate::error::{CoreError, CoreResult};
use crate::traits::HostDeployer;
use crate::types::{
    Certificate, CertificateDetails, CertificateFile, CertificateMaterial, CertificatePatch,
    CertificateQuery, CertificateStats, CertificateStatus, CsrValidation, DownloadFormat, Page,
};

/// Certificate service. Cloning is cheap; background tasks hold their own clone.
#[derive(Clone)]
pub struct CertificateManager {
    ctx: Arc<ServiceContext>,
    issuer: Arc<dyn CertificateIssuer>,
    checker: Arc<dyn PropagationChecker>,
    deployer: Arc<dyn HostDeployer>,
}

impl CertificateManager {
    #[must_use]
    pub fn new(
        ctx: Arc<ServiceContext>,
        issuer: Arc<dyn CertificateIssuer>,
        checker: Arc<dyn PropagationChecker>,
        deployer: Arc<dyn HostDeployer>,
    ) -> Self {
        Self {
            ctx,
            issuer,
            checker,
            deployer,
        }
    }

    // ============ 查询 ============

    /// Certificate owned by `tenant_id`; another tenant's row is reported as missing.
    pub async fn get(&self, id: &str, tenant_id: &str) -> CoreResult<Certificate> {
        self.ctx
            .repos
            .certificates
            .find_by_id(id)
            .await?
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| CoreError::CertificateNotFound(id.to_string()))
    }

    pub async fn list(&self, query: &CertificateQuery) -> CoreResult<Page<Certificate>> {
        let (items, total) = self.ctx.repos.certificates.list(query).await?;
        Ok(Page::new(items, total, query.page))
    }

    pub async fn stats(&self, tenant_id: &str) -> CoreResult<CertificateStats> {
        let certs = self.ctx.repos.certificates.list_for_tenant(tenant_id).await?;
        let now = Utc::now();
        let mut stats = CertificateStats {
            total: certs.len() as u64,
            ..CertificateStats::default()
        };

        for cert in &certs {
            *stats.by_status.entry(cert.status.to_string()).or_default() += 1;
            *stats.by_ca_type.entry(cert.ca_type.to_string()).or_default() += 1;

            if cert.status == CertificateStatus::Issued {
                if let Some(expires_at) = cert.expires_at.filter(|exp| *exp > now) {
                    if expires_at <= now + Duration::days(30) {
                        stats.expiring_in_30_days += 1;
                    }
                    if expires_at <= now + Duration::days(7) {
                        stats.expiring_in_7_days += 1;
                    }
                }
            }
            if cert.is_due_for_renewal(now) {
                stats.auto_renew_pending += 1;
            }
        }
        Ok(stats)
    }

    // ============ 校验 ============

    pub fn validate_csr(&self, csr_pem: &str) -> CsrValidation {
        material::validate_csr(csr_pem)
    }

    pub fn validate_certificate(
        &self,
        certificate_pem: &str,
        private_key_pem: &str,
        chain_pem: Option<&str>,
    ) -> CoreResult<CertificateDetails> {
        material::validate_certificate(certificate_pem, private_key_pem, chain_pem, Utc::now())
            .map(|(_, details)| details)
    }

    // ============ 下载 ============

    pub async fn download(
        &self,
        id: &str,
        format: DownloadFormat,
        tenant_id: &str,
    ) -> CoreResult<CertificateFile> {
        let cert = self.get(id, tenant_id).await?;
        require_issued(&cert, "download")?;
        let material = self.open_material(&cert).await?;
        download::render(&cert, &material, format)
    }

    // ============ 内部 ============

    /// Decrypt the stored blobs off the async runtime.
    async fn open_material(&self, cert: &Certificate) -> CoreResult<CertificateMaterial> {
        let certificate_enc = cert.certificate_enc.clone().ok_or_else(|| {
            CoreError::MaterialUnavailable("certificate material not available".to_string())
        })?;
        let key_enc = cert.private_key_enc.clone();
        let chain_enc = cert.chain_enc.clone();
        let vault = self.ctx.vault.clone();

        blocking(move || {
            Ok(CertificateMaterial {
                certificate_pem: vault.open(&certificate_enc)?,
                private_key_pem: key_enc.map(|blob| vault.open(&blob)).transpose()?,
                chain_pem: chain_enc.map(|blob| vault.open(&blob)).transpose()?,
            })
        })
        .await
    }

    /// Parse the leaf and seal every part of a fresh bundle.
    async fn seal_bundle(&self, bundle: IssuedBundle, actor_id: &str) -> CoreResult<CertificatePatch> {
        let vault = self.ctx.vault.clone();
        let actor_id = actor_id.to_string();
        blocking(move || seal(&vault, &bundle, &actor_id)).await
    }
}

fn seal(vault: &CredentialVault, bundle: &IssuedBundle, actor_id: &str) -> CoreResult<CertificatePatch> {
    let parsed = material::parse_certificate(&bundle.certificate_pem)?;
    Ok(CertificatePatch {
        certificate_enc: Some(vault.encrypt(&bundle.certificate_pem)?),
        private_key_enc: bundle
            .private_key_pem
            .as_deref()
            .map(|key| vault.encrypt(key))
            .transpose()?,
        chain_enc: bundle.chain_pem.as_deref().map(|c| vault.encrypt(c)).transpose()?,
        serial_number: Some(parsed.serial_number),
        fingerprint: Some(parsed.fingerprint),
        issued_at: Some(parsed.not_before),
        expires_at: Some(parsed.not_after),
        last_renew_at: None,
        error_message: None,
        updated_by: Some(actor_id.to_string()),
    })
}

/// Run CPU-bound vault / parsing work on the blocking pool.
async fn blocking<T, F>(f: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::CryptoError(format!("blocking task failed: {e}")))?
}

/// Renew, revoke, deploy and download are only legal from `issued`.
fn require_issued(cert: &Certificate, operation: &str) -> CoreResult<()> {
    if cert.status == CertificateStatus::Issued {
        Ok(())
    } else {
        Err(CoreError::invalid_state(&cert.id, cert.status, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{issued_certificate, TestEnv, TEST_TENANT};
    use crate::types::CaType;

    #[tokio::test]
    async fn get_hides_other_tenants() {
        let env = TestEnv::new();
        let mut cert = issued_certificate("c1", "example.com");
        cert.tenant_id = "other".into();
        env.store.put_certificate(cert);

        let err = env.certificates().get("c1", TEST_TENANT).await.unwrap_err();
        assert!(matches!(err, CoreError::CertificateNotFound(_)));
    }

    #[tokio::test]
    async fn stats_counts_by_status_and_expiry() {
        let env = TestEnv::new();
        let now = Utc::now();

        let mut soon = issued_certificate("c1", "a.example.com");
        soon.expires_at = Some(now + Duration::days(5));
        let mut later = issued_certificate("c2", "b.example.com");
        later.expires_at = Some(now + Duration::days(20));
        later.auto_renew = false;
        let mut revoked = issued_certificate("c3", "c.example.com");
        revoked.status = CertificateStatus::Revoked;
        revoked.ca_type = CaType::Uploaded;
        for cert in [soon, later, revoked] {
            env.store.put_certificate(cert);
        }

        let stats = env.certificates().stats(TEST_TENANT).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status["issued"], 2);
        assert_eq!(stats.by_status["revoked"], 1);
        assert_eq!(stats.by_ca_type["uploaded"], 1);
        assert_eq!(stats.expiring_in_30_days, 2);
        assert_eq!(stats.expiring_in_7_days, 1);
        assert_eq!(stats.auto_renew_pending, 1);
    }

    #[tokio::test]
    async fn download_requires_issued() {
        let env = TestEnv::new();
        let mut cert = issued_certificate("c1", "example.com");
        cert.status = CertificateStatus::Revoked;
        env.store.put_certificate(cert);

        let err = env
            .certificates()
            .download("c1", DownloadFormat::Crt, TEST_TENANT)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }
}
