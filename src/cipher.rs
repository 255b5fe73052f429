use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// AES-256-GCM nonce size in bytes, prepended to every ciphertext.
const NONCE_LEN: usize = 12;

/// Raised when a ciphertext fails authentication under the supplied key.
///
/// This is routine rather than exceptional: probing a garbled-table row with
/// the wrong label is exactly how a mismatched row announces itself.
#[derive(Debug, Error)]
#[error("wrong key or corrupted ciphertext")]
pub struct DecryptError;

/// 256-bit symmetric key attached to one wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireKey([u8; 32]);

impl WireKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        WireKey(bytes)
    }

    /// Generate a random key using the provided RNG.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        WireKey(bytes)
    }

    /// Raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Output layout: `nonce(12) || ciphertext+tag`.
pub fn encrypt(key: &WireKey, plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(&key.0.into());
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .expect("plaintext length within AES-GCM bounds");

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

/// Decrypt data produced by [`encrypt`], verifying its authentication tag.
pub fn decrypt(key: &WireKey, data: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if data.len() < NONCE_LEN {
        return Err(DecryptError);
    }
    let (nonce, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(&key.0.into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| DecryptError)
}
