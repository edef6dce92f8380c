//! The unencrypted bootstrap document.
//!
//! It holds what is needed to derive keys (salt and KDF parameters) and so
//! cannot itself be encrypted. A MAC under a password-derived key is stored
//! next to it; a mismatch means a wrong password or a modified document.

use serde::{Deserialize, Serialize};

use uvs_core::{RepositoryConfig, UvsError, UvsResult};
use uvs_crypto::SALT_SIZE;

use crate::records::{unix_now, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDocument {
    /// Hex-encoded KDF salt
    pub salt: String,
    pub config: RepositoryConfig,
    pub created_at: u64,
}

impl PublicDocument {
    pub fn new(salt: &[u8], config: RepositoryConfig) -> Self {
        Self {
            salt: hex::encode(salt),
            config,
            created_at: unix_now(),
        }
    }

    pub fn salt_bytes(&self) -> UvsResult<Vec<u8>> {
        hex::decode(&self.salt)
            .map_err(|e| UvsError::InvalidRepository(format!("public document salt: {e}")))
    }
}

impl Record for PublicDocument {
    const FORMAT: &'static str = "public/1";

    fn invalid(reason: String) -> UvsError {
        UvsError::InvalidRepository(format!("public document: {reason}"))
    }

    fn check(&self) -> Result<(), String> {
        match hex::decode(&self.salt) {
            Ok(salt) if salt.len() == SALT_SIZE => Ok(()),
            Ok(salt) => Err(format!("salt is {} bytes (expected {SALT_SIZE})", salt.len())),
            Err(e) => Err(format!("salt: {e}")),
        }
    }
}
