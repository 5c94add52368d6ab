//! 证书与部署记录持久化抽象 Trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{
    CertificateDeployment, Certificate, CertificatePatch, CertificateQuery, CertificateStatus,
    ChangeLogEntry, DeploymentStatus,
};

/// Certificate repository
///
/// `status` is written only through [`transition`](Self::transition).
#[async_trait]
pub trait CertificateRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Certificate>>;

    /// Filtered page, newest first, plus the total match count.
    async fn list(&self, query: &CertificateQuery) -> CoreResult<(Vec<Certificate>, u64)>;

    /// Rows for the given ids; missing ids are skipped.
    async fn list_by_ids(&self, ids: &[String]) -> CoreResult<Vec<Certificate>>;

    /// Every row in `status`, any tenant.
    async fn list_by_status(&self, status: CertificateStatus) -> CoreResult<Vec<Certificate>>;

    async fn list_for_tenant(&self, tenant_id: &str) -> CoreResult<Vec<Certificate>>;

    async fn insert(&self, cert: &Certificate, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;

    /// Compare-and-set: move `id` from `from` to `to` and apply `patch`.
    ///
    /// # Returns
    /// * `Ok(true)` - the stored status was `from` and the row was updated
    /// * `Ok(false)` - the stored status differed (or the row is gone); nothing written
    async fn transition(
        &self,
        id: &str,
        from: CertificateStatus,
        to: CertificateStatus,
        patch: &CertificatePatch,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<bool>;

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()>;
}

/// Deployment repository
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Insert every row and the audit entry in one transaction.
    async fn insert_batch(
        &self,
        deployments: &[CertificateDeployment],
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()>;

    async fn find_by_id(&self, id: &str) -> CoreResult<Option<CertificateDeployment>>;

    /// Settle a deployment. Rows already terminal are left untouched.
    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
        deployed_at: Option<DateTime<Utc>>,
    ) -> CoreResult<()>;

    /// Newest first
    async fn list_by_certificate(
        &self,
        certificate_id: &str,
    ) -> CoreResult<Vec<CertificateDeployment>>;

    async fn delete_by_certificate(&self, certificate_id: &str) -> CoreResult<u64>;
}
