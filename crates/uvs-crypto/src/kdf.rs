//! Key derivation: Argon2id password → master key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use uvs_core::config::{KdfAlgorithm, KdfConfig};
use uvs_core::{UvsError, UvsResult};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A 256-bit master key derived from a password via Argon2id.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit master key from a password and the repository salt.
///
/// The work factor comes from the repository's `KdfConfig`; it is the only
/// defence against offline guessing, so production repositories should keep
/// the defaults or raise them.
pub fn derive_master_key(
    password: &SecretString,
    salt: &[u8],
    params: &KdfConfig,
) -> UvsResult<MasterKey> {
    match params.algorithm {
        KdfAlgorithm::Argon2id => {}
    }

    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| UvsError::Config(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    debug!(
        mem_cost_kib = params.mem_cost_kib,
        time_cost = params.time_cost,
        parallelism = params.parallelism,
        "deriving master key"
    );

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| UvsError::Other(anyhow::anyhow!("Argon2id KDF failed: {e}")))?;

    Ok(MasterKey::from_bytes(key))
}
