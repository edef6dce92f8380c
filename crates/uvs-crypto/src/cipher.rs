//! Record encryption with XChaCha20-Poly1305
//!
//! Encrypted record format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! Every call draws a fresh nonce, so equal plaintexts give different
//! ciphertexts. Deduplication relies on fingerprints, never on ciphertext.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use uvs_core::{UvsError, UvsResult};

use crate::keys::SubKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt a serialized record or segment.
///
/// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt_record(key: &SubKey, plaintext: &[u8]) -> UvsResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| UvsError::Other(anyhow::anyhow!("record encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt the output of [`encrypt_record`].
///
/// Truncated input and authentication failure both yield `TamperDetected`;
/// no partial plaintext is ever returned.
pub fn decrypt_record(key: &SubKey, encrypted: &[u8]) -> UvsResult<Vec<u8>> {
    if encrypted.len() < NONCE_SIZE + TAG_SIZE {
        return Err(UvsError::TamperDetected);
    }

    let (nonce_bytes, ciphertext) = encrypted.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| UvsError::TamperDetected)
}
