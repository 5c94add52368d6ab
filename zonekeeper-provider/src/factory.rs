//! Driver registry: `ProviderType` → constructor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::traits::DnsProvider;
use crate::types::{
    CredentialValidationError, ProviderCredentials, ProviderMetadata, ProviderType,
};

#[cfg(feature = "aliyun")]
use crate::providers::AliyunProvider;
#[cfg(feature = "cloudflare")]
use crate::providers::CloudflareProvider;
#[cfg(feature = "dnspod")]
use crate::providers::DnspodProvider;

/// Builds a driver from a decrypted credential map.
pub type ProviderConstructor = Arc<
    dyn Fn(&HashMap<String, String>) -> Result<Arc<dyn DnsProvider>, RegistryError> + Send + Sync,
>;

/// Failure to turn `(type, credentials)` into a driver.
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// Unknown type or missing/empty credential field.
    Credentials(CredentialValidationError),
    /// The driver itself could not be built.
    Provider(ProviderError),
}

impl RegistryError {
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Credentials(CredentialValidationError::UnsupportedProvider { .. })
        )
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials(e) => e.fmt(f),
            Self::Provider(e) => e.fmt(f),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<CredentialValidationError> for RegistryError {
    fn from(e: CredentialValidationError) -> Self {
        Self::Credentials(e)
    }
}

impl From<ProviderError> for RegistryError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

struct Entry {
    metadata: ProviderMetadata,
    constructor: ProviderConstructor,
}

/// Registered driver constructors.
///
/// [`builtin`](Self::builtin) contains every vendor enabled by feature flags; tests and
/// embedders can [`register`](Self::register) their own constructor for a type, replacing
/// the built-in one.
#[derive(Default)]
pub struct ProviderRegistry {
    entries: HashMap<ProviderType, Entry>,
}

impl ProviderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every compiled-in vendor.
    #[must_use]
    pub fn builtin() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "cloudflare")]
        registry.register(CloudflareProvider::metadata(), Arc::new(build_cloudflare));
        #[cfg(feature = "aliyun")]
        registry.register(AliyunProvider::metadata(), Arc::new(build_aliyun));
        #[cfg(feature = "dnspod")]
        registry.register(DnspodProvider::metadata(), Arc::new(build_dnspod));

        registry
    }

    /// Add or replace the constructor for `metadata.id`.
    pub fn register(&mut self, metadata: ProviderMetadata, constructor: ProviderConstructor) {
        log::debug!("registering provider driver '{}'", metadata.id);
        self.entries.insert(
            metadata.id,
            Entry {
                metadata,
                constructor,
            },
        );
    }

    /// Returns `true` when a constructor was removed.
    pub fn unregister(&mut self, provider_type: ProviderType) -> bool {
        self.entries.remove(&provider_type).is_some()
    }

    /// Registered types in declaration order.
    #[must_use]
    pub fn supported_types(&self) -> Vec<ProviderType> {
        ProviderType::ALL
            .iter()
            .copied()
            .filter(|t| self.entries.contains_key(t))
            .collect()
    }

    #[must_use]
    pub fn metadata(&self, provider_type: ProviderType) -> Option<&ProviderMetadata> {
        self.entries.get(&provider_type).map(|e| &e.metadata)
    }

    /// Metadata of every registered driver, for credential forms.
    #[must_use]
    pub fn all_metadata(&self) -> Vec<ProviderMetadata> {
        self.supported_types()
            .into_iter()
            .filter_map(|t| self.metadata(t).cloned())
            .collect()
    }

    /// Configuration-time check: the type is registered and every required field is
    /// present and non-blank. No network call is made.
    pub fn validate(
        &self,
        provider_type: ProviderType,
        credentials: &HashMap<String, String>,
    ) -> Result<(), CredentialValidationError> {
        let entry = self.entry(provider_type)?;
        for field in &entry.metadata.required_fields {
            match credentials.get(&field.key) {
                None => {
                    return Err(CredentialValidationError::MissingField {
                        provider: provider_type,
                        field: field.key.clone(),
                        label: field.label.clone(),
                    });
                }
                Some(v) if v.trim().is_empty() => {
                    return Err(CredentialValidationError::EmptyField {
                        provider: provider_type,
                        field: field.key.clone(),
                        label: field.label.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Validate, then build the driver.
    pub fn create(
        &self,
        provider_type: ProviderType,
        credentials: &HashMap<String, String>,
    ) -> Result<Arc<dyn DnsProvider>, RegistryError> {
        self.validate(provider_type, credentials)?;
        let entry = self.entry(provider_type)?;
        (entry.constructor)(credentials)
    }

    fn entry(&self, provider_type: ProviderType) -> Result<&Entry, CredentialValidationError> {
        self.entries
            .get(&provider_type)
            .ok_or_else(|| CredentialValidationError::UnsupportedProvider {
                provider: provider_type.to_string(),
            })
    }
}

// ============ 内置构造函数 ============

#[cfg(feature = "cloudflare")]
fn build_cloudflare(map: &HashMap<String, String>) -> Result<Arc<dyn DnsProvider>, RegistryError> {
    match ProviderCredentials::from_map(ProviderType::Cloudflare, map)? {
        ProviderCredentials::Cloudflare { api_token } => {
            Ok(Arc::new(CloudflareProvider::new(api_token)?))
        }
        #[allow(unreachable_patterns)]
        other => Err(mismatch(ProviderType::Cloudflare, &other)),
    }
}

#[cfg(feature = "aliyun")]
fn build_aliyun(map: &HashMap<String, String>) -> Result<Arc<dyn DnsProvider>, RegistryError> {
    match ProviderCredentials::from_map(ProviderType::Aliyun, map)? {
        ProviderCredentials::Aliyun {
            access_key_id,
            access_key_secret,
        } => Ok(Arc::new(AliyunProvider::new(access_key_id, access_key_secret)?)),
        #[allow(unreachable_patterns)]
        other => Err(mismatch(ProviderType::Aliyun, &other)),
    }
}

#[cfg(feature = "dnspod")]
fn build_dnspod(map: &HashMap<String, String>) -> Result<Arc<dyn DnsProvider>, RegistryError> {
    match ProviderCredentials::from_map(ProviderType::Dnspod, map)? {
        ProviderCredentials::Dnspod {
            secret_id,
            secret_key,
        } => Ok(Arc::new(DnspodProvider::new(secret_id, secret_key)?)),
        #[allow(unreachable_patterns)]
        other => Err(mismatch(ProviderType::Dnspod, &other)),
    }
}

/// `from_map` returned another vendor's variant; only reachable with several vendors compiled in.
#[allow(dead_code)]
fn mismatch(expected: ProviderType, got: &ProviderCredentials) -> RegistryError {
    RegistryError::Credentials(CredentialValidationError::UnsupportedProvider {
        provider: format!("{expected} (got {})", got.provider_type()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldType, ProviderCredentialField, ProviderLimits};

    fn creds(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn builtin_has_every_vendor() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(
            registry.supported_types(),
            vec![
                ProviderType::Cloudflare,
                ProviderType::Aliyun,
                ProviderType::Dnspod
            ]
        );
        assert_eq!(registry.all_metadata().len(), 3);
    }

    #[test]
    fn validate_reports_missing_and_blank_fields() {
        let registry = ProviderRegistry::builtin();
        let err = registry
            .validate(ProviderType::Aliyun, &creds(&[("accessKeyId", "id")]))
            .unwrap_err();
        assert!(matches!(
            err,
            CredentialValidationError::MissingField { ref field, .. } if field == "accessKeySecret"
        ));

        let err = registry
            .validate(ProviderType::Cloudflare, &creds(&[("apiToken", "  ")]))
            .unwrap_err();
        assert!(matches!(err, CredentialValidationError::EmptyField { .. }));

        registry
            .validate(
                ProviderType::Dnspod,
                &creds(&[("secretId", "a"), ("secretKey", "b")]),
            )
            .unwrap();
    }

    #[test]
    fn create_builds_driver() {
        let registry = ProviderRegistry::builtin();
        let driver = registry
            .create(ProviderType::Cloudflare, &creds(&[("apiToken", "t")]))
            .unwrap();
        assert_eq!(driver.id(), "cloudflare");
    }

    #[test]
    fn unregistered_type_is_unsupported() {
        let mut registry = ProviderRegistry::builtin();
        assert!(registry.unregister(ProviderType::Dnspod));
        assert!(!registry.unregister(ProviderType::Dnspod));

        let err = registry
            .create(
                ProviderType::Dnspod,
                &creds(&[("secretId", "a"), ("secretKey", "b")]),
            )
            .err()
            .unwrap();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("dnspod"));
    }

    #[test]
    fn register_replaces_constructor() {
        let mut registry = ProviderRegistry::new();
        let metadata = ProviderMetadata {
            id: ProviderType::Cloudflare,
            name: "stub".to_string(),
            description: String::new(),
            required_fields: vec![ProviderCredentialField {
                key: "token".to_string(),
                label: "Token".to_string(),
                field_type: FieldType::Password,
                help_text: None,
            }],
            limits: ProviderLimits {
                max_page_size_zones: 10,
                max_page_size_records: 10,
            },
        };
        registry.register(
            metadata,
            Arc::new(|_: &HashMap<String, String>| {
                Err(RegistryError::Provider(ProviderError::NetworkError {
                    provider: "stub".to_string(),
                    detail: "offline".to_string(),
                }))
            }),
        );

        let err = registry
            .create(ProviderType::Cloudflare, &creds(&[("apiToken", "t")]))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::Credentials(_)));

        let err = registry
            .create(ProviderType::Cloudflare, &creds(&[("token", "t")]))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::Provider(_)));
    }
}
