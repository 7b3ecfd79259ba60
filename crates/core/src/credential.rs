//! Sealed provider credentials.
//!
//! Agency API keys for the generative capability are stored and passed
//! around sealed with AES-256-GCM. They are opened only at the point of
//! the generation call and are never logged or persisted in plaintext;
//! [`SealedCredential`]'s `Debug` output is redacted.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Symmetric key for sealing credentials, derived once at startup.
#[derive(Clone)]
pub struct CredentialKey([u8; 32]);

impl CredentialKey {
    /// Derive the sealing key from a configured passphrase (SHA-256).
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        Self(digest.into())
    }
}

impl std::fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialKey(<redacted>)")
    }
}

/// An AES-256-GCM sealed credential: `nonce || ciphertext`.
///
/// Stored as BYTEA alongside the job and loaded separately from the job
/// row so the sealed bytes never travel with ordinary job reads.
#[derive(Clone)]
pub struct SealedCredential(Vec<u8>);

impl SealedCredential {
    /// Wrap already-sealed bytes (e.g. loaded from the database).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The sealed representation for persistence.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SealedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedCredential(<redacted>)")
    }
}

/// Seal a plaintext credential under `key` with a fresh random nonce.
pub fn seal(key: &CredentialKey, plaintext: &str) -> Result<SealedCredential, CoreError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce_bytes[..]);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CoreError::Credential("encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(SealedCredential(sealed))
}

/// Open a sealed credential. Fails on truncation, tampering, or a wrong
/// key; the error carries no key or plaintext material.
pub fn open(key: &CredentialKey, sealed: &SealedCredential) -> Result<String, CoreError> {
    if sealed.0.len() <= NONCE_LEN {
        return Err(CoreError::Credential(
            "sealed credential is truncated".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = sealed.0.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CoreError::Credential("decryption failed".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| CoreError::Credential("credential is not valid UTF-8".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
