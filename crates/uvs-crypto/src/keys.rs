//! Key hierarchy: master key → fingerprint, cipher and MAC sub-keys

use hkdf::Hkdf;
use sha2::Sha256;
use uvs_core::{UvsError, UvsResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::kdf::MasterKey;
use crate::KEY_SIZE;

const FINGERPRINT_DOMAIN: &[u8] = b"uvs-fingerprint";
const CIPHER_DOMAIN: &[u8] = b"uvs-cipher";
const MAC_DOMAIN: &[u8] = b"uvs-public-mac";

/// A 256-bit key derived from the master key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SubKey {
    bytes: [u8; KEY_SIZE],
}

impl SubKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for SubKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// The three independent keys a repository works with.
#[derive(Debug, Clone)]
pub struct SubKeys {
    pub fingerprint: SubKey,
    pub cipher: SubKey,
    pub mac: SubKey,
}

/// Split the master key into domain-separated sub-keys via HKDF-SHA256.
pub fn derive_subkeys(master: &MasterKey) -> UvsResult<SubKeys> {
    Ok(SubKeys {
        fingerprint: hkdf_derive(master.as_bytes(), FINGERPRINT_DOMAIN)?,
        cipher: hkdf_derive(master.as_bytes(), CIPHER_DOMAIN)?,
        mac: hkdf_derive(master.as_bytes(), MAC_DOMAIN)?,
    })
}

/// HKDF-SHA256 key derivation with a domain-specific info string.
fn hkdf_derive(ikm: &[u8; KEY_SIZE], info: &[u8]) -> UvsResult<SubKey> {
    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| UvsError::Other(anyhow::anyhow!("HKDF expand failed: {e}")))?;
    let key = SubKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}
