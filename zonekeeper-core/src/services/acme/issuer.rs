//! `instant-acme` 客户端

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use instant_acme::{
    Account, AuthorizationStatus, ChallengeType, Identifier, NewAccount, NewOrder, Order,
    OrderStatus, RevocationRequest,
};
use rcgen::CertificateParams;
use rustls_pki_types::CertificateDer;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{
    generate_key_pair, split_chain, CertificateIssuer, Dns01Solver, IssueOrder, IssuedBundle,
    KeySource, PendingChallenge,
};
use crate::config::AcmeConfig;
use crate::error::{CoreError, CoreResult};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn acme_error(context: &str, e: impl std::fmt::Display) -> CoreError {
    CoreError::AcmeError(format!("{context}: {e}"))
}

/// Drives orders against one ACME directory. Accounts are created lazily and cached per contact email.
pub struct AcmeIssuer {
    directory_url: String,
    order_timeout: Duration,
    accounts: Mutex<HashMap<String, Arc<Account>>>,
}

impl AcmeIssuer {
    pub fn new(config: &AcmeConfig) -> Self {
        Self {
            directory_url: config.directory_url.clone(),
            order_timeout: Duration::from_secs(config.order_timeout_secs),
            accounts: Mutex::new(HashMap::new()),
        }
    }

    async fn account(&self, email: Option<&str>) -> CoreResult<Arc<Account>> {
        let key = email.unwrap_or_default().to_string();
        let mut accounts = self.accounts.lock().await;
        if let Some(account) = accounts.get(&key) {
            return Ok(Arc::clone(account));
        }

        let contact = email.map(|e| format!("mailto:{e}"));
        let contacts: Vec<&str> = contact.iter().map(String::as_str).collect();
        let (account, _credentials) = Account::builder()
            .map_err(|e| acme_error("failed to build ACME client", e))?
            .create(
                &NewAccount {
                    contact: &contacts,
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                self.directory_url.clone(),
                None,
            )
            .await
            .map_err(|e| acme_error("failed to register ACME account", e))?;

        let contact_label = if key.is_empty() { "no contact" } else { key.as_str() };
        log::info!("Registered ACME account at {} ({contact_label})", self.directory_url);
        let account = Arc::new(account);
        accounts.insert(key, Arc::clone(&account));
        Ok(account)
    }

    async fn run_order(
        &self,
        order: &mut Order,
        request: &IssueOrder,
        solver: &Arc<dyn Dns01Solver>,
        presented: &mut Vec<PendingChallenge>,
    ) -> CoreResult<IssuedBundle> {
        let pending = collect_challenges(order).await?;

        // 先登记再发布，批量中途失败时已写入的记录也能清理掉
        presented.extend(pending.iter().cloned());
        solver.present_batch(&pending).await?;

        mark_ready(order, presented).await?;
        self.wait_for(order, OrderStatus::Ready).await?;

        // 先在阻塞线程里准备 CSR（RSA 生成很慢）
        let domains = request.domains.clone();
        let key = request.key.clone();
        let (csr_der, private_key_pem) = tokio::task::spawn_blocking(move || build_csr(domains, key))
            .await
            .map_err(|e| CoreError::CertificateError(format!("CSR task failed: {e}")))??;

        order
            .finalize_csr(&csr_der)
            .await
            .map_err(|e| acme_error("failed to finalize order", e))?;
        self.wait_for(order, OrderStatus::Valid).await?;

        let bundle = order
            .certificate()
            .await
            .map_err(|e| acme_error("failed to download certificate", e))?
            .ok_or_else(|| CoreError::AcmeError("CA returned no certificate".into()))?;

        let (certificate_pem, chain_pem) = split_chain(&bundle);
        Ok(IssuedBundle {
            certificate_pem,
            chain_pem,
            private_key_pem,
        })
    }

    /// Poll until the order reaches `target` (Ready also accepts an already Valid order).
    async fn wait_for(&self, order: &mut Order, target: OrderStatus) -> CoreResult<()> {
        let deadline = Instant::now() + self.order_timeout;
        loop {
            let state = order
                .refresh()
                .await
                .map_err(|e| acme_error("failed to refresh order", e))?;

            match state.status {
                OrderStatus::Invalid => {
                    let detail = state
                        .error
                        .as_ref()
                        .map(|p| format!("{p:?}"))
                        .unwrap_or_else(|| "no detail".to_string());
                    return Err(CoreError::AcmeError(format!("order became invalid: {detail}")));
                }
                OrderStatus::Valid => return Ok(()),
                OrderStatus::Ready if target == OrderStatus::Ready => return Ok(()),
                status => {
                    if Instant::now() > deadline {
                        return Err(CoreError::AcmeError(format!(
                            "order still {status:?} after {}s",
                            self.order_timeout.as_secs()
                        )));
                    }
                    log::trace!("order is {status:?}, waiting for {target:?}");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

async fn collect_challenges(order: &mut Order) -> CoreResult<Vec<PendingChallenge>> {
    let mut pending = Vec::new();
    let mut authorizations = order.authorizations();

    while let Some(result) = authorizations.next().await {
        let mut authz = result.map_err(|e| acme_error("failed to fetch authorization", e))?;
        let identifier = authz.identifier();
        let domain = match &identifier.identifier {
            Identifier::Dns(domain) => domain.clone(),
            _ => continue,
        };

        if authz.status == AuthorizationStatus::Valid {
            log::debug!("Authorization for {domain} already valid");
            continue;
        }

        let challenge = authz
            .challenge(ChallengeType::Dns01)
            .ok_or_else(|| CoreError::AcmeError(format!("no dns-01 challenge offered for {domain}")))?;
        pending.push(PendingChallenge {
            token: challenge.token.clone(),
            key_authorization: challenge.key_authorization().as_str().to_string(),
            domain,
        });
    }
    Ok(pending)
}

async fn mark_ready(order: &mut Order, presented: &[PendingChallenge]) -> CoreResult<()> {
    let mut authorizations = order.authorizations();

    while let Some(result) = authorizations.next().await {
        let mut authz = result.map_err(|e| acme_error("failed to fetch authorization", e))?;
        if authz.status != AuthorizationStatus::Pending {
            continue;
        }
        let Some(mut challenge) = authz.challenge(ChallengeType::Dns01) else {
            continue;
        };
        if !presented.iter().any(|p| p.token == challenge.token) {
            continue;
        }
        challenge
            .set_ready()
            .await
            .map_err(|e| acme_error("failed to mark challenge ready", e))?;
    }
    Ok(())
}

fn build_csr(domains: Vec<String>, key: KeySource) -> CoreResult<(Vec<u8>, Option<String>)> {
    match key {
        KeySource::Csr(der) => Ok((der, None)),
        KeySource::Generate(key_type) => {
            let key_pair = generate_key_pair(key_type)?;
            let csr = CertificateParams::new(domains)
                .and_then(|params| params.serialize_request(&key_pair))
                .map_err(|e| CoreError::CertificateError(format!("failed to build CSR: {e}")))?;
            Ok((csr.der().to_vec(), Some(key_pair.serialize_pem())))
        }
    }
}

#[async_trait]
impl CertificateIssuer for AcmeIssuer {
    async fn issue(&self, request: &IssueOrder, solver: Arc<dyn Dns01Solver>) -> CoreResult<IssuedBundle> {
        if request.domains.is_empty() {
            return Err(CoreError::ValidationError("an order needs at least one domain".into()));
        }
        let account = self.account(request.email.as_deref()).await?;

        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| acme_error("failed to create order", e))?;
        log::info!("ACME order created for {}", request.domains.join(", "));

        let mut presented = Vec::new();
        let result = self.run_order(&mut order, request, &solver, &mut presented).await;

        // 清理尽力而为，不覆盖签发结果
        if !presented.is_empty() {
            solver.cleanup_batch(&presented).await;
        }

        match &result {
            Ok(_) => log::info!("Certificate issued for {}", request.domains.join(", ")),
            Err(e) => log::error!("Issuance for {} failed: {e}", request.domains.join(", ")),
        }
        result
    }

    async fn revoke(&self, email: Option<&str>, certificate_pem: &str) -> CoreResult<()> {
        let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| CoreError::CertificateError(format!("invalid certificate PEM: {e}")))?;
        let der = CertificateDer::from(pem.contents);

        let account = self.account(email).await?;
        account
            .revoke(&RevocationRequest {
                certificate: &der,
                reason: None,
            })
            .await
            .map_err(|e| acme_error("revocation failed", e))
    }
}
