//! `CertificateRepository` / `DeploymentRepository` implementation for `SqliteStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use zonekeeper_core::error::{CoreError, CoreResult};
use zonekeeper_core::traits::{CertificateRepository, DeploymentRepository};
use zonekeeper_core::types::{
    Certificate, CertificateDeployment, CertificatePatch, CertificateQuery, CertificateStatus,
    ChangeLogEntry, DeploymentStatus,
};

use super::change_log_repo::write_audit;
use super::entity::{certificate, certificate_deployment};
use super::{
    commit, db_err, fmt_opt_ts, fmt_ts, narrow, page_window, parse_enum, parse_opt_ts, parse_ts,
    SqliteStore,
};

// ============ 证书 ============

impl certificate::Model {
    fn into_certificate(self) -> CoreResult<Certificate> {
        let subject_alt_names = serde_json::from_str(&self.subject_alt_names).map_err(|e| {
            CoreError::SerializationError(format!("Invalid subject_alt_names: {e}"))
        })?;

        Ok(Certificate {
            subject_alt_names,
            ca_type: parse_enum(&self.ca_type, "ca_type")?,
            status: parse_enum(&self.status, "certificate status")?,
            key_type: parse_enum(&self.key_type, "key_type")?,
            issued_at: parse_opt_ts(self.issued_at, "issued_at")?,
            expires_at: parse_opt_ts(self.expires_at, "expires_at")?,
            renew_days: narrow(self.renew_days, "renew_days")?,
            last_renew_at: parse_opt_ts(self.last_renew_at, "last_renew_at")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            tenant_id: self.tenant_id,
            zone_id: self.zone_id,
            provider_id: self.provider_id,
            common_name: self.common_name,
            challenge_type: self.challenge_type,
            email: self.email,
            certificate_enc: self.certificate_enc,
            private_key_enc: self.private_key_enc,
            chain_enc: self.chain_enc,
            csr_pem: self.csr_pem,
            serial_number: self.serial_number,
            fingerprint: self.fingerprint,
            auto_renew: self.auto_renew,
            renewed_from: self.renewed_from,
            error_message: self.error_message,
            remark: self.remark,
            created_by: self.created_by,
            updated_by: self.updated_by,
        })
    }
}

fn certificate_to_active_model(cert: &Certificate) -> CoreResult<certificate::ActiveModel> {
    let subject_alt_names = serde_json::to_string(&cert.subject_alt_names)
        .map_err(|e| CoreError::SerializationError(e.to_string()))?;

    Ok(certificate::ActiveModel {
        id: Set(cert.id.clone()),
        tenant_id: Set(cert.tenant_id.clone()),
        zone_id: Set(cert.zone_id.clone()),
        provider_id: Set(cert.provider_id.clone()),
        common_name: Set(cert.common_name.clone()),
        subject_alt_names: Set(subject_alt_names),
        ca_type: Set(cert.ca_type.as_str().to_string()),
        status: Set(cert.status.as_str().to_string()),
        key_type: Set(cert.key_type.as_str().to_string()),
        challenge_type: Set(cert.challenge_type.clone()),
        email: Set(cert.email.clone()),
        certificate_enc: Set(cert.certificate_enc.clone()),
        private_key_enc: Set(cert.private_key_enc.clone()),
        chain_enc: Set(cert.chain_enc.clone()),
        csr_pem: Set(cert.csr_pem.clone()),
        serial_number: Set(cert.serial_number.clone()),
        fingerprint: Set(cert.fingerprint.clone()),
        issued_at: Set(fmt_opt_ts(cert.issued_at)),
        expires_at: Set(fmt_opt_ts(cert.expires_at)),
        auto_renew: Set(cert.auto_renew),
        renew_days: Set(i64::from(cert.renew_days)),
        last_renew_at: Set(fmt_opt_ts(cert.last_renew_at)),
        renewed_from: Set(cert.renewed_from.clone()),
        error_message: Set(cert.error_message.clone()),
        remark: Set(cert.remark.clone()),
        created_by: Set(cert.created_by.clone()),
        updated_by: Set(cert.updated_by.clone()),
        created_at: Set(fmt_ts(cert.created_at)),
        updated_at: Set(fmt_ts(cert.updated_at)),
    })
}

fn into_certificates(rows: Vec<certificate::Model>) -> CoreResult<Vec<Certificate>> {
    rows.into_iter()
        .map(certificate::Model::into_certificate)
        .collect()
}

#[async_trait]
impl CertificateRepository for SqliteStore {
    async fn find_by_id(&self, id: &str) -> CoreResult<Option<Certificate>> {
        let row = certificate::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query certificate"))?;

        row.map(certificate::Model::into_certificate).transpose()
    }

    async fn list(&self, query: &CertificateQuery) -> CoreResult<(Vec<Certificate>, u64)> {
        let mut select = certificate::Entity::find()
            .filter(certificate::Column::TenantId.eq(&query.tenant_id));
        if let Some(keyword) = &query.keyword {
            select = select.filter(certificate::Column::CommonName.contains(keyword));
        }
        if let Some(status) = query.status {
            select = select.filter(certificate::Column::Status.eq(status.as_str()));
        }
        if let Some(ca_type) = query.ca_type {
            select = select.filter(certificate::Column::CaType.eq(ca_type.as_str()));
        }
        if let Some(zone_id) = &query.zone_id {
            select = select.filter(certificate::Column::ZoneId.eq(zone_id));
        }
        if let Some(auto_renew) = query.auto_renew {
            select = select.filter(certificate::Column::AutoRenew.eq(auto_renew));
        }

        let total = select
            .clone()
            .count(&self.db)
            .await
            .map_err(db_err("Failed to count certificates"))?;
        let (offset, limit) = page_window(query.page);
        let rows = select
            .order_by_desc(certificate::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query certificates"))?;

        Ok((into_certificates(rows)?, total))
    }

    async fn list_by_ids(&self, ids: &[String]) -> CoreResult<Vec<Certificate>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = certificate::Entity::find()
            .filter(certificate::Column::Id.is_in(ids.iter().cloned()))
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query certificates"))?;
        into_certificates(rows)
    }

    async fn list_by_status(&self, status: CertificateStatus) -> CoreResult<Vec<Certificate>> {
        let rows = certificate::Entity::find()
            .filter(certificate::Column::Status.eq(status.as_str()))
            .order_by_asc(certificate::Column::ExpiresAt)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query certificates"))?;
        into_certificates(rows)
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> CoreResult<Vec<Certificate>> {
        let rows = certificate::Entity::find()
            .filter(certificate::Column::TenantId.eq(tenant_id))
            .order_by_desc(certificate::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query certificates"))?;
        into_certificates(rows)
    }

    async fn insert(&self, cert: &Certificate, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let model = certificate_to_active_model(cert)?;
        let txn = self.begin().await?;
        certificate::Entity::insert(model)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to insert certificate"))?;
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn transition(
        &self,
        id: &str,
        from: CertificateStatus,
        to: CertificateStatus,
        patch: &CertificatePatch,
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<bool> {
        let txn = self.begin().await?;
        let row = certificate::Entity::find_by_id(id)
            .filter(certificate::Column::Status.eq(from.as_str()))
            .one(&txn)
            .await
            .map_err(db_err("Failed to query certificate"))?;
        let Some(row) = row else {
            return Ok(false);
        };

        let mut cert = row.into_certificate()?;
        cert.status = to;
        patch.apply(&mut cert, Utc::now());

        // status 作为条件再比较一次，并发的另一方会拿到 0 行
        let result = certificate::Entity::update_many()
            .set(certificate_to_active_model(&cert)?)
            .filter(certificate::Column::Id.eq(id))
            .filter(certificate::Column::Status.eq(from.as_str()))
            .exec(&txn)
            .await
            .map_err(db_err("Failed to update certificate"))?;
        if result.rows_affected != 1 {
            return Ok(false);
        }

        write_audit(&txn, audit).await;
        commit(txn).await?;
        Ok(true)
    }

    async fn delete(&self, id: &str, audit: Option<&ChangeLogEntry>) -> CoreResult<()> {
        let txn = self.begin().await?;
        let result = certificate::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(db_err("Failed to delete certificate"))?;
        if result.rows_affected == 0 {
            return Err(CoreError::CertificateNotFound(id.to_string()));
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }
}

// ============ 部署记录 ============

impl certificate_deployment::Model {
    fn into_deployment(self) -> CoreResult<CertificateDeployment> {
        Ok(CertificateDeployment {
            status: parse_enum(&self.status, "deployment status")?,
            deployed_at: parse_opt_ts(self.deployed_at, "deployed_at")?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            id: self.id,
            certificate_id: self.certificate_id,
            tenant_id: self.tenant_id,
            host: self.host,
            deploy_path: self.deploy_path,
            service_name: self.service_name,
            error_message: self.error_message,
        })
    }
}

fn deployment_to_active_model(deployment: &CertificateDeployment) -> certificate_deployment::ActiveModel {
    certificate_deployment::ActiveModel {
        id: Set(deployment.id.clone()),
        certificate_id: Set(deployment.certificate_id.clone()),
        tenant_id: Set(deployment.tenant_id.clone()),
        host: Set(deployment.host.clone()),
        deploy_path: Set(deployment.deploy_path.clone()),
        service_name: Set(deployment.service_name.clone()),
        status: Set(deployment.status.as_str().to_string()),
        error_message: Set(deployment.error_message.clone()),
        deployed_at: Set(fmt_opt_ts(deployment.deployed_at)),
        created_at: Set(fmt_ts(deployment.created_at)),
        updated_at: Set(fmt_ts(deployment.updated_at)),
    }
}

#[async_trait]
impl DeploymentRepository for SqliteStore {
    async fn insert_batch(
        &self,
        deployments: &[CertificateDeployment],
        audit: Option<&ChangeLogEntry>,
    ) -> CoreResult<()> {
        let txn = self.begin().await?;
        for deployment in deployments {
            certificate_deployment::Entity::insert(deployment_to_active_model(deployment))
                .exec(&txn)
                .await
                .map_err(db_err("Failed to insert deployment"))?;
        }
        write_audit(&txn, audit).await;
        commit(txn).await
    }

    async fn find_by_id(&self, id: &str) -> CoreResult<Option<CertificateDeployment>> {
        let row = certificate_deployment::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err("Failed to query deployment"))?;

        row.map(certificate_deployment::Model::into_deployment)
            .transpose()
    }

    async fn update_status(
        &self,
        id: &str,
        status: DeploymentStatus,
        error_message: Option<&str>,
        deployed_at: Option<DateTime<Utc>>,
    ) -> CoreResult<()> {
        let result = certificate_deployment::Entity::update_many()
            .set(certificate_deployment::ActiveModel {
                status: Set(status.as_str().to_string()),
                error_message: Set(error_message.map(String::from)),
                deployed_at: Set(fmt_opt_ts(deployed_at)),
                updated_at: Set(fmt_ts(Utc::now())),
                ..Default::default()
            })
            .filter(certificate_deployment::Column::Id.eq(id))
            .filter(certificate_deployment::Column::Status.eq(DeploymentStatus::Pending.as_str()))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to update deployment"))?;
        if result.rows_affected == 0 {
            log::debug!("Deployment {id} already settled, status update skipped");
        }
        Ok(())
    }

    async fn list_by_certificate(
        &self,
        certificate_id: &str,
    ) -> CoreResult<Vec<CertificateDeployment>> {
        let rows = certificate_deployment::Entity::find()
            .filter(certificate_deployment::Column::CertificateId.eq(certificate_id))
            .order_by_desc(certificate_deployment::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err("Failed to query deployments"))?;
        rows.into_iter()
            .map(certificate_deployment::Model::into_deployment)
            .collect()
    }

    async fn delete_by_certificate(&self, certificate_id: &str) -> CoreResult<u64> {
        let result = certificate_deployment::Entity::delete_many()
            .filter(certificate_deployment::Column::CertificateId.eq(certificate_id))
            .exec(&self.db)
            .await
            .map_err(db_err("Failed to delete deployments"))?;
        Ok(result.rows_affected)
    }
}
