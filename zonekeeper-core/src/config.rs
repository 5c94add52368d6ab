//! Core configuration
//!
//! Loaded once by the application layer and passed around as `Arc<CoreConfig>`.
//! Every section carries `#[serde(default)]`, so a partial file is fine.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Let's Encrypt production directory URL
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
/// Let's Encrypt staging directory URL
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub vault: VaultConfig,
    pub provider: ProviderConfig,
    pub acme: AcmeConfig,
    pub worker_pool: WorkerPoolConfig,
    pub scheduler: SchedulerConfig,
    pub certificate: CertificateConfig,
}

impl CoreConfig {
    /// Reject values the services cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.vault.validate()?;

        let positive = [
            ("provider.request_timeout_secs", self.provider.request_timeout_secs),
            ("acme.propagation_timeout_secs", self.acme.propagation_timeout_secs),
            ("acme.propagation_interval_secs", self.acme.propagation_interval_secs),
            ("acme.batch_timeout_secs", self.acme.batch_timeout_secs),
            ("acme.order_timeout_secs", self.acme.order_timeout_secs),
            ("scheduler.zone_sync_interval_secs", self.scheduler.zone_sync_interval_secs),
            ("scheduler.health_check_interval_secs", self.scheduler.health_check_interval_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(CoreError::ConfigError(format!("{name} must be greater than 0")));
            }
        }
        if self.acme.batch_size == 0 {
            return Err(CoreError::ConfigError("acme.batch_size must be greater than 0".into()));
        }
        if self.acme.directory_url.trim().is_empty() {
            return Err(CoreError::ConfigError("acme.directory_url is empty".into()));
        }
        if self.worker_pool.workers == 0 || self.worker_pool.queue_capacity == 0 {
            return Err(CoreError::ConfigError(
                "worker_pool.workers and worker_pool.queue_capacity must be greater than 0".into(),
            ));
        }
        if self.certificate.default_renew_days == 0 {
            return Err(CoreError::ConfigError(
                "certificate.default_renew_days must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

// ============ Vault ============

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// AES passphrases; the first one seals, all of them are tried when opening.
    pub keys: Vec<String>,
    /// Refuse to start without a key (production mode).
    pub require_key: bool,
}

impl VaultConfig {
    fn validate(&self) -> CoreResult<()> {
        if self.require_key && self.keys.is_empty() {
            return Err(CoreError::ConfigError(
                "vault.keys is empty but vault.require_key is set".into(),
            ));
        }
        let mut seen = HashSet::new();
        for key in &self.keys {
            if key.trim().is_empty() {
                return Err(CoreError::ConfigError("vault.keys contains an empty key".into()));
            }
            if !seen.insert(key.as_str()) {
                return Err(CoreError::ConfigError("vault.keys contains a duplicate key".into()));
            }
        }
        Ok(())
    }
}

// 不打印密钥
impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("keys", &format_args!("[{} redacted]", self.keys.len()))
            .field("require_key", &self.require_key)
            .finish()
    }
}

// ============ Provider ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Deadline applied to every driver call.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============ ACME ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcmeConfig {
    pub directory_url: String,
    pub propagation_timeout_secs: u64,
    pub propagation_interval_secs: u64,
    /// Resolvers asked during the propagation wait; all of them must see the value.
    pub nameservers: Vec<IpAddr>,
    pub challenge_ttl: u32,
    pub batch_size: usize,
    pub batch_timeout_secs: u64,
    /// Budget for an order to become ready / valid.
    pub order_timeout_secs: u64,
    /// Multi-label public suffixes: `example.co.uk` keeps three labels as its zone.
    pub zone_suffixes: Vec<String>,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory_url: LETSENCRYPT_PRODUCTION.to_string(),
            propagation_timeout_secs: 120,
            propagation_interval_secs: 10,
            nameservers: vec![
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ],
            challenge_ttl: 600,
            batch_size: 10,
            batch_timeout_secs: 300,
            order_timeout_secs: 300,
            zone_suffixes: ["com.cn", "net.cn", "org.cn", "gov.cn", "co.uk", "org.uk", "com.au", "co.jp"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

// ============ Worker Pool ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

// ============ Scheduler ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub zone_sync_interval_secs: u64,
    pub health_check_interval_secs: u64,
    /// Expiry notifiers (UTC)
    pub notify_at: DailyTime,
    pub auto_renew_at: DailyTime,
    pub cleanup_at: DailyTime,
    pub change_log_retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zone_sync_interval_secs: 300,
            health_check_interval_secs: 3600,
            notify_at: DailyTime::new(9, 0),
            auto_renew_at: DailyTime::new(2, 0),
            cleanup_at: DailyTime::new(3, 0),
            change_log_retention_days: 90,
        }
    }
}

/// `HH:MM` wall-clock time, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DailyTime {
    pub hour: u32,
    pub minute: u32,
}

impl DailyTime {
    /// Out-of-range parts are clamped.
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self {
            hour: if hour > 23 { 23 } else { hour },
            minute: if minute > 59 { 59 } else { minute },
        }
    }
}

impl FromStr for DailyTime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::ConfigError(format!("invalid time of day '{s}', expected HH:MM"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for DailyTime {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DailyTime> for String {
    fn from(value: DailyTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ============ Certificate ============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    pub default_renew_days: u32,
    /// Root directory used by the directory deployer.
    pub deploy_root: PathBuf,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            default_renew_days: 30,
            deploy_root: PathBuf::from("deploy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler.notify_at, DailyTime::new(9, 0));
        assert_eq!(config.acme.batch_size, 10);
        assert_eq!(config.worker_pool.queue_capacity, 256);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: CoreConfig = serde_json::from_value(serde_json::json!({
            "scheduler": { "auto_renew_at": "04:30" },
            "vault": { "keys": ["k1"] }
        }))
        .unwrap();
        assert_eq!(config.scheduler.auto_renew_at, DailyTime::new(4, 30));
        assert_eq!(config.scheduler.zone_sync_interval_secs, 300);
        assert_eq!(config.vault.keys, vec!["k1".to_string()]);
    }

    #[test]
    fn rejects_bad_values() {
        assert!("25:00".parse::<DailyTime>().is_err());
        assert!("0900".parse::<DailyTime>().is_err());

        let mut config = CoreConfig::default();
        config.vault.keys = vec!["a".into(), "a".into()];
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.vault.require_key = true;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.scheduler.zone_sync_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn vault_debug_hides_keys() {
        let vault = VaultConfig {
            keys: vec!["super-secret".into()],
            require_key: false,
        };
        assert!(!format!("{vault:?}").contains("super-secret"));
    }
}
