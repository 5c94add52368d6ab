//! 批量操作
//!
//! 先校验全部 id 属于当前租户，任何一个不满足就整批拒绝；之后逐项隔离处理。

use super::lifecycle::check_renewable;
use super::CertificateManager;
use crate::error::{CoreError, CoreResult};
use crate::services::log_core_error;
use crate::types::{Actor, BatchOutcome, Certificate, DeployTarget};

impl CertificateManager {
    /// Rows for `ids` in request order, duplicates dropped.
    async fn load_batch(&self, ids: &[String], tenant_id: &str) -> CoreResult<Vec<Certificate>> {
        if ids.is_empty() {
            return Err(CoreError::ValidationError("no certificate ids given".into()));
        }
        let mut unique: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(id.clone());
            }
        }

        let mut found = self.ctx.repos.certificates.list_by_ids(&unique).await?;
        let mut ordered = Vec::with_capacity(unique.len());
        for id in &unique {
            let pos = found
                .iter()
                .position(|c| &c.id == id && c.tenant_id == tenant_id)
                .ok_or_else(|| CoreError::CertificateNotFound(id.clone()))?;
            ordered.push(found.swap_remove(pos));
        }
        Ok(ordered)
    }

    /// Queue a renewal per certificate. A state check that fails up front counts as that item's failure.
    pub async fn batch_renew(&self, ids: &[String], actor: &Actor) -> CoreResult<BatchOutcome> {
        let certs = self.load_batch(ids, &actor.tenant_id).await?;
        let mut outcome = BatchOutcome::default();

        for cert in certs {
            if let Err(e) = check_renewable(&cert) {
                outcome.record_failure(cert.id, e);
                continue;
            }
            let this = self.clone();
            let id = cert.id.clone();
            let task_actor = actor.clone();
            let submitted = self.ctx.workers.submit(format!("renew certificate {id}"), async move {
                if let Err(e) = this.renew(&id, &task_actor).await {
                    log_core_error(&format!("Renewal of certificate {id} failed"), &e);
                }
            });
            match submitted {
                Ok(()) => outcome.record_success(),
                Err(e) => outcome.record_failure(cert.id, e),
            }
        }
        log::info!(
            "Batch renew: {} queued, {} rejected",
            outcome.success_count,
            outcome.failure_count
        );
        Ok(outcome)
    }

    pub async fn batch_delete(&self, ids: &[String], actor: &Actor) -> CoreResult<BatchOutcome> {
        let certs = self.load_batch(ids, &actor.tenant_id).await?;
        let mut outcome = BatchOutcome::default();

        for cert in certs {
            match self.delete(&cert.id, actor).await {
                Ok(()) => outcome.record_success(),
                Err(e) => {
                    log_core_error(&format!("Failed to delete certificate {}", cert.id), &e);
                    outcome.record_failure(cert.id, e);
                }
            }
        }
        Ok(outcome)
    }

    /// JSON array of certificate metadata. Sealed material is never serialized.
    pub async fn batch_export(&self, ids: &[String], tenant_id: &str) -> CoreResult<String> {
        let certs = self.load_batch(ids, tenant_id).await?;
        Ok(serde_json::to_string_pretty(&certs)?)
    }

    pub async fn batch_deploy(
        &self,
        ids: &[String],
        targets: &[DeployTarget],
        actor: &Actor,
    ) -> CoreResult<BatchOutcome> {
        let certs = self.load_batch(ids, &actor.tenant_id).await?;
        let mut outcome = BatchOutcome::default();

        for cert in certs {
            match self.deploy(&cert.id, targets, actor).await {
                Ok(_) => outcome.record_success(),
                Err(e) => outcome.record_failure(cert.id, e),
            }
        }
        Ok(outcome)
    }
}
