//! 多主机部署

use std::sync::Arc;

use chrono::Utc;

use super::{require_issued, CertificateManager};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    resource, Actor, CertificateDeployment, CertificateMaterial, CertificateStatus, ChangeAction,
    ChangeLogEntry, DeployTarget, DeploymentStatus,
};

impl CertificateManager {
    /// Create one deployment row per host and push to each host from its own worker task.
    ///
    /// Host failures only touch their own row; the certificate itself is never changed.
    pub async fn deploy(
        &self,
        id: &str,
        targets: &[DeployTarget],
        actor: &Actor,
    ) -> CoreResult<Vec<CertificateDeployment>> {
        if targets.is_empty() {
            return Err(CoreError::ValidationError("at least one deploy host is required".into()));
        }
        if targets.iter().any(|t| t.host.trim().is_empty()) {
            return Err(CoreError::ValidationError("deploy host must not be empty".into()));
        }

        let cert = self.get(id, &actor.tenant_id).await?;
        require_issued(&cert, "deploy")?;
        let material = Arc::new(self.open_material(&cert).await?);

        let now = Utc::now();
        let mut deployments: Vec<CertificateDeployment> = targets
            .iter()
            .map(|target| CertificateDeployment {
                id: uuid::Uuid::new_v4().to_string(),
                certificate_id: cert.id.clone(),
                tenant_id: cert.tenant_id.clone(),
                host: target.host.trim().to_string(),
                deploy_path: target
                    .deploy_path
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| DeployTarget::DEFAULT_PATH.to_string()),
                service_name: target
                    .service_name
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DeployTarget::DEFAULT_SERVICE.to_string()),
                status: DeploymentStatus::Pending,
                error_message: None,
                deployed_at: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let hosts: Vec<&str> = deployments.iter().map(|d| d.host.as_str()).collect();
        let entry = ChangeLogEntry::new(actor, resource::CERTIFICATE, &cert.id, ChangeAction::Deploy)
            .after(&deployments)
            .describe(format!("deploy to {}", hosts.join(", ")));
        // 行和审计同一事务落库，之后才开始推送
        self.ctx
            .repos
            .deployments
            .insert_batch(&deployments, Some(&entry))
            .await?;

        for deployment in &mut deployments {
            let this = self.clone();
            let row = deployment.clone();
            let material = Arc::clone(&material);
            let submitted = self.ctx.workers.submit(
                format!("deploy {} to {}", cert.id, deployment.host),
                async move { this.run_deployment(&row, &material).await },
            );
            if let Err(e) = submitted {
                let message = e.to_string();
                self.ctx
                    .repos
                    .deployments
                    .update_status(&deployment.id, DeploymentStatus::Failed, Some(&message), None)
                    .await?;
                deployment.status = DeploymentStatus::Failed;
                deployment.error_message = Some(message);
            }
        }

        Ok(deployments)
    }

    /// Push to one host and settle its row.
    async fn run_deployment(&self, deployment: &CertificateDeployment, material: &CertificateMaterial) {
        // 排队期间证书可能已被吊销
        let result = match self
            .ctx
            .repos
            .certificates
            .find_by_id(&deployment.certificate_id)
            .await
        {
            Ok(Some(cert)) if cert.status == CertificateStatus::Issued => {
                self.deployer.deploy(deployment, material).await
            }
            Ok(Some(cert)) => Err(CoreError::invalid_state(&cert.id, cert.status, "deploy")),
            Ok(None) => Err(CoreError::CertificateNotFound(deployment.certificate_id.clone())),
            Err(e) => Err(e),
        };

        let (status, error, deployed_at) = match &result {
            Ok(()) => {
                log::info!(
                    "Certificate {} deployed to {}:{}",
                    deployment.certificate_id,
                    deployment.host,
                    deployment.deploy_path
                );
                (DeploymentStatus::Success, None, Some(Utc::now()))
            }
            Err(e) => {
                log::warn!(
                    "Deployment of certificate {} to {} failed: {e}",
                    deployment.certificate_id,
                    deployment.host
                );
                (DeploymentStatus::Failed, Some(e.to_string()), None)
            }
        };

        if let Err(e) = self
            .ctx
            .repos
            .deployments
            .update_status(&deployment.id, status, error.as_deref(), deployed_at)
            .await
        {
            log::error!("Failed to record deployment {}: {e}", deployment.id);
        }
    }

    /// Deployment history of a certificate, newest first.
    pub async fn list_deployments(
        &self,
        certificate_id: &str,
        tenant_id: &str,
    ) -> CoreResult<Vec<CertificateDeployment>> {
        self.get(certificate_id, tenant_id).await?;
        self.ctx
            .repos
            .deployments
            .list_by_certificate(certificate_id)
            .await
    }
}
