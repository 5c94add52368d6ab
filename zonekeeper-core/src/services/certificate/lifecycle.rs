//! 签发 / 续期 / 吊销 / 上传

use std::sync::Arc;

use chrono::Utc;

use super::{material, require_issued, CertificateManager};
use crate::error::{CoreError, CoreResult};
use crate::services::acme::{Dns01Adapter, Dns01Solver, IssueOrder, IssuedBundle, KeySource};
use crate::services::log_core_error;
use crate::types::{
    resource, Actor, CaType, Certificate, CertificatePatch, CertificateStatus, ChangeAction,
    ChangeLogEntry, ChangeStatus, CsrIssueRequest, DeployTarget, IssueCertificateRequest, KeyType,
    UploadCertificateRequest,
};
use crate::utils::{is_within_zone, normalize_certificate_domain};

/// Normalize, require at least one, drop duplicates (first occurrence wins).
fn normalize_domains(domains: &[String]) -> CoreResult<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(domains.len());
    for domain in domains {
        let domain = normalize_certificate_domain(domain)?;
        if !normalized.contains(&domain) {
            normalized.push(domain);
        }
    }
    if normalized.is_empty() {
        return Err(CoreError::ValidationError("at least one domain is required".into()));
    }
    Ok(normalized)
}

fn validate_email(email: &str) -> CoreResult<String> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(CoreError::ValidationError(format!("invalid email address: '{email}'"))),
    }
}

/// Only issued ACME certificates can be renewed.
pub(super) fn check_renewable(cert: &Certificate) -> CoreResult<()> {
    require_issued(cert, "renew")?;
    if cert.ca_type == CaType::Uploaded {
        return Err(CoreError::ValidationError(
            "uploaded certificates cannot be renewed, upload a replacement instead".into(),
        ));
    }
    Ok(())
}

fn certificate_entry(actor: &Actor, id: &str, action: ChangeAction) -> ChangeLogEntry {
    ChangeLogEntry::new(actor, resource::CERTIFICATE, id, action)
}

impl CertificateManager {
    /// Fresh `pending` row with the defaults shared by every ACME request.
    fn pending_row(&self, actor: &Actor, domains: Vec<String>, email: String) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            zone_id: None,
            provider_id: None,
            common_name: domains.first().cloned().unwrap_or_default(),
            subject_alt_names: domains,
            ca_type: CaType::LetsEncrypt,
            status: CertificateStatus::Pending,
            key_type: KeyType::default(),
            challenge_type: "dns".to_string(),
            email: Some(email),
            certificate_enc: None,
            private_key_enc: None,
            chain_enc: None,
            csr_pem: None,
            serial_number: None,
            fingerprint: None,
            issued_at: None,
            expires_at: None,
            auto_renew: true,
            renew_days: self.ctx.config.certificate.default_renew_days,
            last_renew_at: None,
            renewed_from: None,
            error_message: None,
            remark: None,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Zone and provider must exist for the tenant, every domain must sit inside the zone.
    async fn check_targets(
        &self,
        zone_id: &str,
        provider_id: &str,
        domains: &[String],
        actor: &Actor,
    ) -> CoreResult<()> {
        let zone = self.ctx.get_zone(zone_id, &actor.tenant_id).await?;
        self.ctx.get_provider(provider_id, Some(&actor.tenant_id)).await?;

        if let Some(outside) = domains.iter().find(|d| !is_within_zone(d, &zone.name)) {
            return Err(CoreError::ValidationError(format!(
                "domain {outside} is not part of zone {}",
                zone.name
            )));
        }
        Ok(())
    }

    // ============ 签发 ============

    /// Validate, insert a `pending` row and queue the ACME flow. Poll the row for the outcome.
    pub async fn issue(&self, request: IssueCertificateRequest, actor: &Actor) -> CoreResult<Certificate> {
        let domains = normalize_domains(&request.domains)?;
        let email = validate_email(&request.email)?;
        self.check_targets(&request.zone_id, &request.provider_id, &domains, actor)
            .await?;

        let mut cert = self.pending_row(actor, domains, email);
        cert.zone_id = Some(request.zone_id);
        cert.provider_id = Some(request.provider_id);
        cert.key_type = request.key_type;
        cert.auto_renew = request.auto_renew.unwrap_or(true);
        if let Some(days) = request.renew_days {
            cert.renew_days = days;
        }
        cert.remark = request.remark;

        self.insert_and_enqueue(cert, KeySource::Generate(request.key_type), request.deploy_hosts, actor)
            .await
    }

    /// Same flow with a caller-supplied CSR; the private key never reaches us.
    ///
    /// Every requested domain must be in the CSR. Extra CSR names are added to the order.
    pub async fn issue_with_csr(&self, request: CsrIssueRequest, actor: &Actor) -> CoreResult<Certificate> {
        let csr = material::parse_csr(&request.csr_pem)?;
        let mut domains = normalize_domains(&request.domains)?;
        let email = validate_email(&request.email)?;

        let csr_names = csr.names();
        let missing: Vec<&str> = domains
            .iter()
            .filter(|d| !csr_names.contains(d))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "CSR does not cover: {}",
                missing.join(", ")
            )));
        }
        for extra in csr_names {
            if !domains.contains(&extra) {
                log::warn!("CSR carries {extra}, which was not requested; adding it to the order");
                domains.push(extra);
            }
        }
        self.check_targets(&request.zone_id, &request.provider_id, &domains, actor)
            .await?;

        let mut cert = self.pending_row(actor, domains, email);
        cert.zone_id = Some(request.zone_id);
        cert.provider_id = Some(request.provider_id);
        cert.key_type = csr.key_type();
        cert.csr_pem = Some(request.csr_pem);
        cert.auto_renew = request.auto_renew.unwrap_or(true);
        cert.remark = request.remark;

        self.insert_and_enqueue(cert, KeySource::Csr(csr.der), request.deploy_hosts, actor)
            .await
    }

    async fn insert_and_enqueue(
        &self,
        cert: Certificate,
        key: KeySource,
        deploy_hosts: Vec<DeployTarget>,
        actor: &Actor,
    ) -> CoreResult<Certificate> {
        let audit = certificate_entry(actor, &cert.id, ChangeAction::Issue)
            .after(&cert)
            .describe(format!("issuance requested for {}", cert.subject_alt_names.join(", ")));
        self.ctx.repos.certificates.insert(&cert, Some(&audit)).await?;

        let this = self.clone();
        let id = cert.id.clone();
        let task_actor = actor.clone();
        let submitted = self.ctx.workers.submit(format!("issue certificate {id}"), async move {
            if this.run_issuance(&id, key, &task_actor).await.is_ok() && !deploy_hosts.is_empty() {
                if let Err(e) = this.deploy(&id, &deploy_hosts, &task_actor).await {
                    log_core_error(&format!("Deployment of certificate {id} failed"), &e);
                }
            }
        });

        if let Err(e) = submitted {
            // 没排上队就不会有人推进这一行
            let patch = CertificatePatch::error(e.to_string());
            self.ctx
                .repos
                .certificates
                .transition(&cert.id, CertificateStatus::Pending, CertificateStatus::Failed, &patch, None)
                .await?;
            return Err(e);
        }
        log::info!("Certificate {} queued for issuance", cert.id);
        Ok(cert)
    }

    /// `pending → processing → issued`, or `failed` with the error recorded.
    pub(super) async fn run_issuance(&self, id: &str, key: KeySource, actor: &Actor) -> CoreResult<Certificate> {
        let repo = &self.ctx.repos.certificates;
        let processing = CertificatePatch {
            updated_by: Some(actor.id.clone()),
            ..CertificatePatch::default()
        };
        if !repo
            .transition(id, CertificateStatus::Pending, CertificateStatus::Processing, &processing, None)
            .await?
        {
            let status = repo
                .find_by_id(id)
                .await?
                .map_or_else(|| "gone".to_string(), |c| c.status.to_string());
            log::warn!("Certificate {id} is {status}, skipping issuance");
            return Err(CoreError::invalid_state(id, status, "issue"));
        }

        let cert = repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| CoreError::CertificateNotFound(id.to_string()))?;

        let outcome = match self.acquire(&cert, key).await {
            Ok(bundle) => self.seal_bundle(bundle, &actor.id).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(patch) => {
                let audit = certificate_entry(actor, id, ChangeAction::Issue).describe(format!(
                    "issued, expires {}",
                    patch.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default()
                ));
                repo.transition(id, CertificateStatus::Processing, CertificateStatus::Issued, &patch, Some(&audit))
                    .await?;
                log::info!("Certificate {id} issued for {}", cert.subject_alt_names.join(", "));
                repo.find_by_id(id)
                    .await?
                    .ok_or_else(|| CoreError::CertificateNotFound(id.to_string()))
            }
            Err(e) => {
                log_core_error(&format!("Issuance of certificate {id} failed"), &e);
                let audit = certificate_entry(actor, id, ChangeAction::Issue)
                    .status(ChangeStatus::Failed)
                    .describe(e.to_string());
                let patch = CertificatePatch {
                    updated_by: Some(actor.id.clone()),
                    ..CertificatePatch::error(e.to_string())
                };
                if let Err(write_err) = repo
                    .transition(id, CertificateStatus::Processing, CertificateStatus::Failed, &patch, Some(&audit))
                    .await
                {
                    log::error!("Failed to record issuance failure for {id}: {write_err}");
                }
                Err(e)
            }
        }
    }

    /// Run one ACME order through the certificate's DNS provider.
    async fn acquire(&self, cert: &Certificate, key: KeySource) -> CoreResult<IssuedBundle> {
        let provider_id = cert.provider_id.as_deref().ok_or_else(|| {
            CoreError::ValidationError(format!("certificate {} has no DNS provider", cert.id))
        })?;
        let provider = self.ctx.get_provider(provider_id, Some(&cert.tenant_id)).await?;
        let driver = self.ctx.provider_driver(&provider).await?;

        let mut adapter = Dns01Adapter::new(driver, Arc::clone(&self.checker), &self.ctx.config.acme);
        if let Some(zone_id) = &cert.zone_id {
            match self.ctx.get_zone(zone_id, &cert.tenant_id).await {
                Ok(zone) => adapter = adapter.with_zone_hint(zone.name),
                Err(e) => log::warn!("Zone {zone_id} of certificate {} unavailable: {e}", cert.id),
            }
        }
        let adapter = Arc::new(adapter);
        let solver: Arc<dyn Dns01Solver> = adapter.clone();

        let order = IssueOrder {
            domains: cert.subject_alt_names.clone(),
            email: cert.email.clone(),
            key,
        };
        let result = self.issuer.issue(&order, solver).await;
        if result.is_err() {
            adapter.clear_all().await;
        }
        result
    }

    // ============ 续期 ============

    /// Issue a successor row for the same names; the predecessor becomes `renewed`,
    /// or `renew_failed` when the ACME flow fails.
    ///
    /// A second renewal of the same certificate while one is running fails with `InvalidState`.
    pub async fn renew(&self, id: &str, actor: &Actor) -> CoreResult<Certificate> {
        let Some(_claim) = self.ctx.renewals.try_lock(id) else {
            self.get(id, &actor.tenant_id).await?;
            return Err(CoreError::invalid_state(id, "renewing", "renew"));
        };
        // 拿到锁之后再读，前一次续期可能刚把它改成 renewed
        let old = self.get(id, &actor.tenant_id).await?;
        check_renewable(&old)?;

        let key = match &old.csr_pem {
            Some(pem) => KeySource::Csr(material::parse_csr(pem)?.der),
            None => KeySource::Generate(old.key_type),
        };

        let now = Utc::now();
        let successor = Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            status: CertificateStatus::Pending,
            renewed_from: Some(old.id.clone()),
            certificate_enc: None,
            private_key_enc: None,
            chain_enc: None,
            serial_number: None,
            fingerprint: None,
            issued_at: None,
            expires_at: None,
            last_renew_at: None,
            error_message: None,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
            ..old.clone()
        };
        let audit = certificate_entry(actor, &successor.id, ChangeAction::Renew)
            .after(&successor)
            .describe(format!("renewal of {}", old.id));
        self.ctx.repos.certificates.insert(&successor, Some(&audit)).await?;

        let result = self.run_issuance(&successor.id, key, actor).await;

        let (to, patch, audit) = match &result {
            Ok(renewed) => (
                CertificateStatus::Renewed,
                CertificatePatch {
                    last_renew_at: Some(now),
                    updated_by: Some(actor.id.clone()),
                    ..CertificatePatch::default()
                },
                certificate_entry(actor, &old.id, ChangeAction::Renew)
                    .describe(format!("renewed by {}", renewed.id)),
            ),
            Err(e) => (
                CertificateStatus::RenewFailed,
                CertificatePatch {
                    last_renew_at: Some(now),
                    updated_by: Some(actor.id.clone()),
                    ..CertificatePatch::error(e.to_string())
                },
                certificate_entry(actor, &old.id, ChangeAction::Renew)
                    .status(ChangeStatus::Failed)
                    .describe(e.to_string()),
            ),
        };
        if !self
            .ctx
            .repos
            .certificates
            .transition(&old.id, CertificateStatus::Issued, to, &patch, Some(&audit))
            .await?
        {
            // 续期期间被吊销或删除；新证书照常保留
            log::warn!("Certificate {} left issued during renewal, not marking it {to}", old.id);
        }
        result
    }

    // ============ 吊销 ============

    /// `issued → revoked`. Repeating the call on a revoked row is a no-op.
    ///
    /// ACME certificates are also revoked at the CA; a CA-side failure is only logged.
    pub async fn revoke(&self, id: &str, actor: &Actor) -> CoreResult<Certificate> {
        let cert = self.get(id, &actor.tenant_id).await?;
        if cert.status == CertificateStatus::Revoked {
            return Ok(cert);
        }
        require_issued(&cert, "revoke")?;

        if cert.ca_type != CaType::Uploaded {
            let revoked_at_ca = match self.open_material(&cert).await {
                Ok(material) => {
                    self.issuer
                        .revoke(cert.email.as_deref(), &material.certificate_pem)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = revoked_at_ca {
                log::warn!("CA revocation of certificate {id} failed, revoking locally only: {e}");
            }
        }

        let audit = certificate_entry(actor, id, ChangeAction::Revoke).before(&cert);
        let patch = CertificatePatch {
            updated_by: Some(actor.id.clone()),
            ..CertificatePatch::default()
        };
        self.ctx
            .repos
            .certificates
            .transition(id, CertificateStatus::Issued, CertificateStatus::Revoked, &patch, Some(&audit))
            .await?;

        // 并发吊销时另一方已经写入
        let current = self.get(id, &actor.tenant_id).await?;
        if current.status == CertificateStatus::Revoked {
            log::info!("Certificate {id} revoked");
            Ok(current)
        } else {
            Err(CoreError::invalid_state(id, current.status, "revoke"))
        }
    }

    // ============ 上传 ============

    /// Store an externally issued certificate directly as `issued`.
    pub async fn upload(&self, request: UploadCertificateRequest, actor: &Actor) -> CoreResult<Certificate> {
        let (parsed, _) = material::validate_certificate(
            &request.certificate_pem,
            &request.private_key_pem,
            request.chain_pem.as_deref(),
            Utc::now(),
        )?;
        if let Some(zone_id) = &request.zone_id {
            self.ctx.get_zone(zone_id, &actor.tenant_id).await?;
        }

        let bundle = IssuedBundle {
            certificate_pem: request.certificate_pem,
            chain_pem: request.chain_pem.filter(|c| !c.trim().is_empty()),
            private_key_pem: Some(request.private_key_pem),
        };
        let patch = self.seal_bundle(bundle, &actor.id).await?;

        let now = Utc::now();
        let cert = Certificate {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: actor.tenant_id.clone(),
            zone_id: request.zone_id,
            provider_id: None,
            common_name: parsed.common_name.clone(),
            subject_alt_names: parsed.names(),
            ca_type: CaType::Uploaded,
            status: CertificateStatus::Issued,
            key_type: parsed.key_type(),
            challenge_type: "none".to_string(),
            email: None,
            certificate_enc: patch.certificate_enc,
            private_key_enc: patch.private_key_enc,
            chain_enc: patch.chain_enc,
            csr_pem: None,
            serial_number: patch.serial_number,
            fingerprint: patch.fingerprint,
            issued_at: patch.issued_at,
            expires_at: patch.expires_at,
            auto_renew: false,
            renew_days: self.ctx.config.certificate.default_renew_days,
            last_renew_at: None,
            renewed_from: None,
            error_message: None,
            remark: request.remark,
            created_by: actor.id.clone(),
            updated_by: actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        let audit = certificate_entry(actor, &cert.id, ChangeAction::Upload).after(&cert);
        self.ctx.repos.certificates.insert(&cert, Some(&audit)).await?;
        log::info!("Uploaded certificate {} for {}", cert.id, cert.common_name);
        Ok(cert)
    }

    // ============ 删除 ============

    /// Delete a certificate and its deployment rows. Refused while an ACME flow is running.
    pub async fn delete(&self, id: &str, actor: &Actor) -> CoreResult<()> {
        let cert = self.get(id, &actor.tenant_id).await?;
        if cert.status == CertificateStatus::Processing {
            return Err(CoreError::invalid_state(id, cert.status, "delete"));
        }

        let removed = self.ctx.repos.deployments.delete_by_certificate(id).await?;
        let audit = certificate_entry(actor, id, ChangeAction::Delete)
            .before(&cert)
            .describe(format!("{removed} deployment record(s) removed"));
        self.ctx.repos.certificates.delete(id, Some(&audit)).await
    }
}
