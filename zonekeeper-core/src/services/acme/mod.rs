//! ACME DNS-01 support
//!
//! - [`Dns01Adapter`]: presents / cleans up `_acme-challenge` TXT records through a DNS driver
//! - [`PropagationChecker`]: confirms a TXT value is visible before the CA validates
//! - [`AcmeIssuer`]: `instant-acme` client that drives one order end to end

mod challenge;
mod issuer;
mod keys;
mod propagation;

pub use challenge::{challenge_fqdn, challenge_value, extract_zone, Dns01Adapter};
pub use issuer::AcmeIssuer;
pub use keys::generate_key_pair;
pub use propagation::{wait_for_propagation, HickoryPropagationChecker, PropagationChecker};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::KeyType;

/// One DNS-01 challenge of an order.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    pub domain: String,
    pub token: String,
    pub key_authorization: String,
}

/// The two DNS-01 operations an ACME client needs.
#[async_trait]
pub trait Dns01Solver: Send + Sync {
    /// Publish the TXT value for `domain` and wait until it is visible.
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> CoreResult<()>;

    /// Remove the TXT value again. Callers treat failures as best effort.
    async fn cleanup(&self, domain: &str, token: &str, key_authorization: &str) -> CoreResult<()>;

    /// Present every challenge of a multi-name order. Sequential unless overridden.
    async fn present_batch(&self, challenges: &[PendingChallenge]) -> CoreResult<()> {
        for c in challenges {
            self.present(&c.domain, &c.token, &c.key_authorization).await?;
        }
        Ok(())
    }

    /// Best effort: every challenge is attempted, failures are logged.
    async fn cleanup_batch(&self, challenges: &[PendingChallenge]) {
        for c in challenges {
            if let Err(e) = self.cleanup(&c.domain, &c.token, &c.key_authorization).await {
                log::warn!("Failed to clean up challenge for {}: {e}", c.domain);
            }
        }
    }
}

/// Where the certificate key comes from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Generate a fresh key pair of this type.
    Generate(KeyType),
    /// Caller-supplied CSR (DER); the private key never reaches us.
    Csr(Vec<u8>),
}

/// Input of one issuance.
#[derive(Debug, Clone)]
pub struct IssueOrder {
    /// CN first, then the remaining SANs.
    pub domains: Vec<String>,
    pub email: Option<String>,
    pub key: KeySource,
}

/// What the CA returned.
#[derive(Clone)]
pub struct IssuedBundle {
    /// Leaf certificate PEM
    pub certificate_pem: String,
    /// Intermediates, when the CA sent any
    pub chain_pem: Option<String>,
    /// `None` for CSR flows
    pub private_key_pem: Option<String>,
}

impl std::fmt::Debug for IssuedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedBundle")
            .field("certificate_pem", &self.certificate_pem.len())
            .field("chain_pem", &self.chain_pem.as_ref().map(String::len))
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Talks to a certificate authority.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    /// Run one order: account, authorizations via `solver`, finalize, download.
    async fn issue(&self, order: &IssueOrder, solver: Arc<dyn Dns01Solver>) -> CoreResult<IssuedBundle>;

    /// Ask the CA to revoke a certificate it issued.
    async fn revoke(&self, email: Option<&str>, certificate_pem: &str) -> CoreResult<()>;
}

/// Split a PEM bundle into (leaf, rest). The rest is `None` when only the leaf is present.
pub(crate) fn split_chain(bundle: &str) -> (String, Option<String>) {
    const END: &str = "-----END CERTIFICATE-----";
    match bundle.find(END) {
        Some(pos) => {
            let split = pos + END.len();
            let leaf = format!("{}\n", bundle[..split].trim());
            let rest = bundle[split..].trim();
            let chain = (!rest.is_empty()).then(|| format!("{rest}\n"));
            (leaf, chain)
        }
        None => (bundle.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::Mutex;

    /// Relies on the trait's default batch methods.
    #[derive(Default)]
    struct RecordingSolver {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Dns01Solver for RecordingSolver {
        async fn present(&self, domain: &str, _: &str, _: &str) -> CoreResult<()> {
            self.calls.lock().unwrap().push(format!("present {domain}"));
            if domain.starts_with("bad.") {
                return Err(CoreError::AcmeError(format!("cannot present {domain}")));
            }
            Ok(())
        }

        async fn cleanup(&self, domain: &str, _: &str, _: &str) -> CoreResult<()> {
            self.calls.lock().unwrap().push(format!("cleanup {domain}"));
            Err(CoreError::AcmeError("gone".into()))
        }
    }

    fn challenge(domain: &str) -> PendingChallenge {
        PendingChallenge {
            domain: domain.to_string(),
            token: "tok".into(),
            key_authorization: format!("ka-{domain}"),
        }
    }

    #[tokio::test]
    async fn default_batch_stops_at_first_failure_and_cleans_everything() {
        let solver = RecordingSolver::default();
        let items = [challenge("a.example.com"), challenge("bad.example.com"), challenge("c.example.com")];

        assert!(solver.present_batch(&items).await.is_err());
        solver.cleanup_batch(&items).await;

        assert_eq!(
            *solver.calls.lock().unwrap(),
            [
                "present a.example.com",
                "present bad.example.com",
                "cleanup a.example.com",
                "cleanup bad.example.com",
                "cleanup c.example.com",
            ]
        );
    }

    #[test]
    fn split_chain_separates_leaf() {
        let bundle = "-----BEGIN CERTIFICATE-----\nAAA\n-----END CERTIFICATE-----\n\
                      -----BEGIN CERTIFICATE-----\nBBB\n-----END CERTIFICATE-----\n";
        let (leaf, chain) = split_chain(bundle);
        assert!(leaf.contains("AAA") && !leaf.contains("BBB"));
        assert!(chain.unwrap().starts_with("-----BEGIN CERTIFICATE-----\nBBB"));

        let (leaf, chain) = split_chain("-----BEGIN CERTIFICATE-----\nAAA\n-----END CERTIFICATE-----");
        assert!(leaf.ends_with("-----END CERTIFICATE-----\n"));
        assert!(chain.is_none());
    }
}
