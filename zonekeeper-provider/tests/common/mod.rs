//! 共享测试工具

#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use zonekeeper_provider::{DnsProvider, ProviderRegistry, ProviderType, RecordData};

/// 缺少环境变量时跳过测试
#[macro_export]
macro_rules! skip_if_no_credentials {
    ($($var:expr),+) => {
        $(
            if std::env::var($var).is_err() {
                eprintln!("跳过测试: 缺少环境变量 {}", $var);
                return;
            }
        )+
    };
}

pub struct TestContext {
    pub provider: Arc<dyn DnsProvider>,
    /// Zone name the credential manages.
    pub zone: String,
}

impl TestContext {
    /// `env_map` pairs a credential key with the environment variable holding it.
    pub fn from_env(provider_type: ProviderType, env_map: &[(&str, &str)]) -> Option<Self> {
        let mut credentials = HashMap::new();
        for (key, var) in env_map {
            credentials.insert((*key).to_string(), env::var(var).ok()?);
        }
        let provider = ProviderRegistry::builtin()
            .create(provider_type, &credentials)
            .ok()?;
        Some(Self {
            provider,
            zone: env::var("TEST_DOMAIN").ok()?,
        })
    }
}

/// `_test-xxxxxxxx`, unique per run.
pub fn test_record_name() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("_test-{}", &uuid[..8])
}

/// Create and update payloads for the round-trip test.
pub fn record_pair() -> (RecordData, RecordData) {
    (
        RecordData::TXT {
            text: "zonekeeper-test-1".to_string(),
        },
        RecordData::TXT {
            text: "zonekeeper-test-2".to_string(),
        },
    )
}
