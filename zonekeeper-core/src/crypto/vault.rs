//! Credential vault
//!
//! Seals with the first configured key, opens with any of them, and accepts
//! legacy plaintext JSON blobs written before encryption existed.

use std::collections::HashMap;
use std::sync::Arc;

use super::{blob_version, open, seal_with_version, BlobVersion};
use crate::config::VaultConfig;
use crate::error::{CoreError, CoreResult};
use crate::traits::ProviderRepository;
use crate::types::Provider;

/// Result of [`CredentialVault::decrypt`].
#[derive(Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: String,
    /// Index of the key that opened the blob; `None` for legacy plaintext.
    pub key_index: Option<usize>,
}

impl Decrypted {
    pub fn is_legacy(&self) -> bool {
        self.key_index.is_none()
    }
}

// 明文不进日志
impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("plaintext", &"<redacted>")
            .field("key_index", &self.key_index)
            .finish()
    }
}

/// Keys are fixed at construction. Cloning shares them.
#[derive(Clone)]
pub struct CredentialVault {
    keys: Arc<[String]>,
    seal_version: BlobVersion,
}

impl CredentialVault {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            keys: config.keys.iter().cloned().collect(),
            seal_version: BlobVersion::CURRENT,
        }
    }

    /// Cheaper KDF for tests.
    #[cfg(test)]
    pub(crate) fn with_blob_version(mut self, version: BlobVersion) -> Self {
        self.seal_version = version;
        self
    }

    pub fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    pub fn encrypt(&self, plaintext: &str) -> CoreResult<String> {
        let key = self
            .keys
            .first()
            .ok_or_else(|| CoreError::CryptoError("no AES key configured".to_string()))?;
        seal_with_version(plaintext.as_bytes(), key, self.seal_version)
    }

    pub fn encrypt_map(&self, credentials: &HashMap<String, String>) -> CoreResult<String> {
        self.encrypt(&serde_json::to_string(credentials)?)
    }

    /// Try every key in order, then fall back to legacy plaintext JSON.
    pub fn decrypt(&self, blob: &str) -> CoreResult<Decrypted> {
        if let Some((index, plaintext)) = self.try_keys(blob) {
            return Ok(Decrypted {
                plaintext,
                key_index: Some(index),
            });
        }

        let trimmed = blob.trim();
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(_)) => Ok(Decrypted {
                plaintext: trimmed.to_string(),
                key_index: None,
            }),
            _ => Err(CoreError::CredentialError(
                "blob fails every configured key and is not plaintext JSON".to_string(),
            )),
        }
    }

    /// Keys only, no plaintext fallback. Used for certificate material.
    pub fn open(&self, blob: &str) -> CoreResult<String> {
        self.try_keys(blob).map(|(_, plaintext)| plaintext).ok_or_else(|| {
            CoreError::CryptoError("blob cannot be opened with any configured key".to_string())
        })
    }

    pub fn decrypt_map(&self, blob: &str) -> CoreResult<HashMap<String, String>> {
        parse_map(&self.decrypt(blob)?.plaintext)
    }

    /// Decrypt a provider's credential map.
    ///
    /// A legacy plaintext blob is re-sealed with the primary key in the
    /// background; a failed upgrade is only logged.
    pub async fn decrypt_provider(
        &self,
        provider: &Provider,
        repo: &Arc<dyn ProviderRepository>,
    ) -> CoreResult<HashMap<String, String>> {
        // PBKDF2 60 万轮，不能占着运行时线程
        let vault = self.clone();
        let blob = provider.credentials_enc.clone();
        let decrypted = tokio::task::spawn_blocking(move || vault.decrypt(&blob))
            .await
            .map_err(|e| CoreError::CryptoError(format!("decrypt task failed: {e}")))??;
        let credentials = parse_map(&decrypted.plaintext)?;

        if decrypted.is_legacy() && self.has_key() {
            log::info!(
                "Provider {} has plaintext credentials, upgrading to encrypted storage",
                provider.id
            );
            let vault = self.clone();
            let repo = Arc::clone(repo);
            let provider_id = provider.id.clone();
            let plaintext = decrypted.plaintext;
            tokio::spawn(async move {
                let sealed = tokio::task::spawn_blocking(move || vault.encrypt(&plaintext)).await;
                let result = match sealed {
                    Ok(Ok(blob)) => repo.update_credentials(&provider_id, &blob).await,
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(CoreError::CryptoError(e.to_string())),
                };
                match result {
                    Ok(()) => log::info!("Credentials of provider {provider_id} encrypted"),
                    Err(e) => {
                        log::warn!("Failed to upgrade credentials of provider {provider_id}: {e}");
                    }
                }
            });
        }

        Ok(credentials)
    }

    /// Whether `blob` should be re-sealed: it is legacy, was opened by a
    /// non-primary key, or uses an older format version.
    pub fn needs_rotation(&self, blob: &str) -> bool {
        match self.decrypt(blob) {
            Ok(d) => self.is_stale(blob, &d),
            Err(_) => false,
        }
    }

    /// Re-seal with the primary key when needed. `Ok(None)` means already current.
    pub fn reseal(&self, blob: &str) -> CoreResult<Option<String>> {
        let decrypted = self.decrypt(blob)?;
        if !self.is_stale(blob, &decrypted) {
            return Ok(None);
        }
        self.encrypt(&decrypted.plaintext).map(Some)
    }

    fn is_stale(&self, blob: &str, decrypted: &Decrypted) -> bool {
        decrypted.key_index != Some(0) || blob_version(blob) != Some(self.seal_version)
    }

    fn try_keys(&self, blob: &str) -> Option<(usize, String)> {
        blob_version(blob)?;
        self.keys.iter().enumerate().find_map(|(index, key)| {
            let bytes = open(blob, key).ok()?;
            String::from_utf8(bytes).ok().map(|s| (index, s))
        })
    }
}

fn parse_map(plaintext: &str) -> CoreResult<HashMap<String, String>> {
    serde_json::from_str(plaintext)
        .map_err(|e| CoreError::CredentialError(format!("credential JSON is not a string map: {e}")))
}
