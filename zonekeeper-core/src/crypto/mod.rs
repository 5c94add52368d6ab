//! encryption module
//!
//! AES-256-GCM with a PBKDF2-derived key. A sealed blob is one string:
//! `<version>:<salt_b64>:<nonce_b64>:<ciphertext_b64>`.

mod vault;
mod versions;

pub use vault::{CredentialVault, Decrypted};
pub use versions::BlobVersion;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac_array;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CoreError, CoreResult};

const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const KEY_LENGTH: usize = 32; // AES-256

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> [u8; KEY_LENGTH] {
    pbkdf2_hmac_array::<Sha256, KEY_LENGTH>(password.as_bytes(), salt, iterations)
}

/// Encrypt `plaintext` with the current blob version.
pub fn seal(plaintext: &[u8], password: &str) -> CoreResult<String> {
    seal_with_version(plaintext, password, BlobVersion::CURRENT)
}

pub fn seal_with_version(
    plaintext: &[u8],
    password: &str,
    version: BlobVersion,
) -> CoreResult<String> {
    let mut salt = [0u8; SALT_LENGTH];
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    rand::rng().fill_bytes(&mut salt);
    rand::rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt, version.iterations());
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::CryptoError(format!("Failed to create cipher: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| CoreError::CryptoError(format!("Encryption failed: {e}")))?;

    Ok(format!(
        "{}:{}:{}:{}",
        version.tag(),
        BASE64.encode(salt),
        BASE64.encode(nonce_bytes),
        BASE64.encode(ciphertext)
    ))
}

/// Format version of a sealed blob, `None` when `blob` does not look sealed.
pub fn blob_version(blob: &str) -> Option<BlobVersion> {
    let (tag, rest) = blob.split_once(':')?;
    (rest.split(':').count() == 3).then_some(())?;
    BlobVersion::from_tag(tag)
}

/// Decrypt a sealed blob, honoring its version prefix.
pub fn open(blob: &str, password: &str) -> CoreResult<Vec<u8>> {
    let mut parts = blob.trim().split(':');
    let (Some(tag), Some(salt_b64), Some(nonce_b64), Some(ct_b64), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CoreError::CryptoError("malformed encrypted blob".to_string()));
    };
    let version = BlobVersion::from_tag(tag)
        .ok_or_else(|| CoreError::CryptoError(format!("unsupported blob version '{tag}'")))?;

    let salt = BASE64
        .decode(salt_b64)
        .map_err(|e| CoreError::CryptoError(format!("Invalid salt: {e}")))?;
    let nonce_bytes = BASE64
        .decode(nonce_b64)
        .map_err(|e| CoreError::CryptoError(format!("Invalid nonce: {e}")))?;
    let ciphertext = BASE64
        .decode(ct_b64)
        .map_err(|e| CoreError::CryptoError(format!("Invalid ciphertext: {e}")))?;
    if nonce_bytes.len() != NONCE_LENGTH {
        return Err(CoreError::CryptoError("Invalid nonce length".to_string()));
    }

    let key = derive_key(password, &salt, version.iterations());
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CoreError::CryptoError(format!("Failed to create cipher: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| {
            CoreError::CryptoError("Decryption failed: invalid key or corrupted data".to_string())
        })
}
