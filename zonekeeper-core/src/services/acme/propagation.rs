//! TXT 传播检查
//!
//! 每个 nameserver 单独建一个无缓存的 resolver，所有 nameserver 都看到期望值才算传播完成。

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use tokio::time::Instant;

use crate::error::{CoreError, CoreResult};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait PropagationChecker: Send + Sync {
    /// Whether `fqdn` serves a TXT record equal to `expected` right now.
    async fn is_visible(&self, fqdn: &str, expected: &str) -> CoreResult<bool>;
}

/// Poll `checker` every `interval` until the value is visible or `timeout` elapses.
pub async fn wait_for_propagation(
    checker: &dyn PropagationChecker,
    fqdn: &str,
    expected: &str,
    timeout: Duration,
    interval: Duration,
) -> CoreResult<()> {
    let started = Instant::now();
    let deadline = started + timeout;

    loop {
        match checker.is_visible(fqdn, expected).await {
            Ok(true) => {
                log::debug!("TXT {fqdn} propagated after {}s", started.elapsed().as_secs());
                return Ok(());
            }
            Ok(false) => log::trace!("TXT {fqdn} not visible yet"),
            Err(e) => log::warn!("TXT lookup for {fqdn} failed: {e}"),
        }

        if Instant::now() + interval > deadline {
            return Err(CoreError::AcmeError(format!(
                "TXT record {fqdn} did not propagate within {}s",
                timeout.as_secs()
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Queries each configured nameserver directly, with caching disabled.
pub struct HickoryPropagationChecker {
    resolvers: Vec<(IpAddr, TokioResolver)>,
}

impl HickoryPropagationChecker {
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let resolvers = nameservers
            .iter()
            .map(|ip| (*ip, build_resolver(*ip)))
            .collect();
        Self { resolvers }
    }
}

fn build_resolver(ip: IpAddr) -> TokioResolver {
    let config = ResolverConfig::from_parts(
        None,
        vec![],
        NameServerConfigGroup::from_ips_clear(&[ip], 53, true),
    );
    let mut opts = ResolverOpts::default();
    opts.timeout = QUERY_TIMEOUT;
    opts.attempts = 2;
    opts.cache_size = 0;

    TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
        .with_options(opts)
        .build()
}

#[async_trait]
impl PropagationChecker for HickoryPropagationChecker {
    async fn is_visible(&self, fqdn: &str, expected: &str) -> CoreResult<bool> {
        if self.resolvers.is_empty() {
            return Err(CoreError::ConfigError("no nameservers configured for propagation checks".into()));
        }
        // 绝对域名，避免 search domain 干扰
        let name = format!("{}.", fqdn.trim_end_matches('.'));

        for (ip, resolver) in &self.resolvers {
            let values: Vec<String> = match resolver.txt_lookup(name.as_str()).await {
                Ok(txt) => txt
                    .iter()
                    .map(|record| {
                        record
                            .iter()
                            .map(|d| String::from_utf8_lossy(d).to_string())
                            .collect::<String>()
                    })
                    .collect(),
                Err(e) if e.is_no_records_found() || e.is_nx_domain() => Vec::new(),
                Err(e) => {
                    return Err(CoreError::AcmeError(format!("TXT lookup at {ip} failed: {e}")));
                }
            };

            if !values.iter().any(|v| v == expected) {
                log::trace!("{ip} does not serve the expected value for {fqdn} yet");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
