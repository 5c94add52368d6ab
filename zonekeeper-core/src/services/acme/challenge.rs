//! DNS-01 challenge adapter
//!
//! 1. 计算 `_acme-challenge.<domain>` 与 TXT 值
//! 2. 通过 DNS 驱动写入 TXT 记录，等待传播
//! 3. 验证结束后删除（失败只记日志）

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use zonekeeper_provider::{full_name_to_relative, with_deadline, DnsProvider};

use super::propagation::{wait_for_propagation, PropagationChecker};
use super::{Dns01Solver, PendingChallenge};
use crate::config::AcmeConfig;
use crate::error::{CoreError, CoreResult};
use crate::utils::is_within_zone;

const CHALLENGE_LABEL: &str = "_acme-challenge";
const DRIVER_TIMEOUT: Duration = Duration::from_secs(30);

/// `_acme-challenge.<domain>`; a wildcard uses its base domain.
pub fn challenge_fqdn(domain: &str) -> String {
    let base = domain.trim_start_matches("*.").trim_end_matches('.');
    format!("{CHALLENGE_LABEL}.{}", base.to_ascii_lowercase())
}

/// base64url (no padding) of SHA-256(key authorization)
pub fn challenge_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

/// Registrable zone of `domain`: the last two labels, or three when the last
/// two form one of `suffixes` (`example.co.uk`).
pub fn extract_zone(domain: &str, suffixes: &[String]) -> String {
    let domain = domain
        .trim_start_matches("*.")
        .trim_end_matches('.')
        .to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() <= 2 {
        return domain;
    }

    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if suffixes.iter().any(|s| s.eq_ignore_ascii_case(&last_two)) {
        3
    } else {
        2
    };
    labels[labels.len().saturating_sub(keep)..].join(".")
}

#[derive(Debug, Clone)]
struct Presented {
    zone: String,
    record_name: String,
    value: String,
}

/// Implements [`Dns01Solver`] on top of one DNS driver.
pub struct Dns01Adapter {
    driver: Arc<dyn DnsProvider>,
    checker: Arc<dyn PropagationChecker>,
    /// Zone the certificate belongs to; preferred over label counting.
    zone_hint: Option<String>,
    ttl: u32,
    propagation_timeout: Duration,
    propagation_interval: Duration,
    batch_size: usize,
    batch_timeout: Duration,
    zone_suffixes: Vec<String>,
    /// domain -> presented values, for `clear_all`
    presented: Mutex<HashMap<String, Vec<Presented>>>,
}

impl Dns01Adapter {
    pub fn new(
        driver: Arc<dyn DnsProvider>,
        checker: Arc<dyn PropagationChecker>,
        config: &AcmeConfig,
    ) -> Self {
        Self {
            driver,
            checker,
            zone_hint: None,
            ttl: config.challenge_ttl,
            propagation_timeout: Duration::from_secs(config.propagation_timeout_secs),
            propagation_interval: Duration::from_secs(config.propagation_interval_secs),
            batch_size: config.batch_size.max(1),
            batch_timeout: Duration::from_secs(config.batch_timeout_secs),
            zone_suffixes: config.zone_suffixes.clone(),
            presented: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_zone_hint(mut self, zone: impl Into<String>) -> Self {
        self.zone_hint = Some(zone.into().to_ascii_lowercase());
        self
    }

    fn zone_for(&self, domain: &str) -> String {
        match &self.zone_hint {
            Some(zone) if is_within_zone(domain, zone) => zone.clone(),
            _ => extract_zone(domain, &self.zone_suffixes),
        }
    }

    /// Remove every value this adapter presented and has not cleaned up yet.
    pub async fn clear_all(&self) {
        let leftovers: Vec<(String, Presented)> = {
            let mut presented = self.presented.lock().await;
            presented
                .drain()
                .flat_map(|(domain, values)| values.into_iter().map(move |p| (domain.clone(), p)))
                .collect()
        };
        for (domain, item) in leftovers {
            if let Err(e) = self.delete_value(&item).await {
                log::warn!("Failed to clear challenge record for {domain}: {e}");
            }
        }
    }

    /// Number of values presented and not yet cleaned up.
    pub async fn outstanding(&self) -> usize {
        self.presented.lock().await.values().map(Vec::len).sum()
    }

    async fn delete_value(&self, item: &Presented) -> CoreResult<()> {
        with_deadline(
            self.driver.id(),
            DRIVER_TIMEOUT,
            self.driver
                .delete_txt_challenge(&item.zone, &item.record_name, &item.value),
        )
        .await
        .map_err(CoreError::from)
    }
}

#[async_trait]
impl Dns01Solver for Dns01Adapter {
    async fn present(&self, domain: &str, token: &str, key_authorization: &str) -> CoreResult<()> {
        let fqdn = challenge_fqdn(domain);
        let zone = self.zone_for(domain);
        let record_name = full_name_to_relative(&fqdn, &zone);
        let value = challenge_value(key_authorization);

        log::info!(
            "Presenting DNS-01 challenge for {domain} in zone {zone} via {}",
            self.driver.id()
        );
        log::debug!("Challenge token for {domain}: {token}");

        let record = with_deadline(
            self.driver.id(),
            DRIVER_TIMEOUT,
            self.driver
                .create_txt_challenge(&zone, &record_name, &value, self.ttl),
        )
        .await?;

        self.presented
            .lock()
            .await
            .entry(domain.to_string())
            .or_default()
            .push(Presented {
                zone,
                record_name,
                value: value.clone(),
            });
        log::debug!("Challenge record {} created, waiting for propagation", record.record_id);

        wait_for_propagation(
            self.checker.as_ref(),
            &fqdn,
            &value,
            self.propagation_timeout,
            self.propagation_interval,
        )
        .await
    }

    async fn cleanup(&self, domain: &str, _token: &str, key_authorization: &str) -> CoreResult<()> {
        let value = challenge_value(key_authorization);
        let item = {
            let mut presented = self.presented.lock().await;
            let taken = presented.get_mut(domain).and_then(|values| {
                let index = values.iter().position(|p| p.value == value)?;
                Some(values.remove(index))
            });
            if presented.get(domain).is_some_and(Vec::is_empty) {
                presented.remove(domain);
            }
            taken
        };
        let item = item.unwrap_or_else(|| {
            let zone = self.zone_for(domain);
            Presented {
                record_name: full_name_to_relative(&challenge_fqdn(domain), &zone),
                zone,
                value,
            }
        });

        match self.delete_value(&item).await {
            Ok(()) => {
                log::info!("DNS-01 challenge record for {domain} cleaned up");
                Ok(())
            }
            Err(e) => {
                log::warn!("Failed to clean up DNS-01 challenge record for {domain}: {e}");
                Err(e)
            }
        }
    }

    /// `batch_size` challenges at a time, all under `batch_timeout`.
    ///
    /// Values already presented stay tracked on failure so
    /// [`clear_all`](Dns01Adapter::clear_all) can remove them.
    async fn present_batch(&self, challenges: &[PendingChallenge]) -> CoreResult<()> {
        let work = async {
            for chunk in challenges.chunks(self.batch_size) {
                let results = join_all(
                    chunk
                        .iter()
                        .map(|c| self.present(&c.domain, &c.token, &c.key_authorization)),
                )
                .await;
                if let Some(err) = results.into_iter().find_map(Result::err) {
                    return Err(err);
                }
            }
            Ok(())
        };

        match tokio::time::timeout(self.batch_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::AcmeError(format!(
                "presenting {} challenges timed out after {}s",
                challenges.len(),
                self.batch_timeout.as_secs()
            ))),
        }
    }

    async fn cleanup_batch(&self, challenges: &[PendingChallenge]) {
        for chunk in challenges.chunks(self.batch_size) {
            // cleanup 自己会记 warn
            join_all(
                chunk
                    .iter()
                    .map(|c| self.cleanup(&c.domain, &c.token, &c.key_authorization)),
            )
            .await;
        }
    }
}
