//! `CryptoContext`: everything the repository needs from its keys

use rand::RngCore;
use secrecy::SecretString;
use std::io::Read;
use uvs_core::config::{CipherAlgorithm, FingerprintAlgorithm};
use uvs_core::{ObjectId, RepositoryConfig, SnapshotId, UvsError, UvsResult};

use crate::cipher::{decrypt_record, encrypt_record};
use crate::kdf::{derive_master_key, MasterKey};
use crate::keys::{derive_subkeys, SubKeys};
use crate::SALT_SIZE;

/// Generate a random repository salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Keys of one open repository.
///
/// Fingerprints are deterministic for a given password, salt and digest
/// length; encryption is randomized.
#[derive(Debug, Clone)]
pub struct CryptoContext {
    keys: SubKeys,
    digest_len: usize,
}

impl CryptoContext {
    /// Run the repository KDF and split the result into sub-keys.
    pub fn derive(
        password: &SecretString,
        salt: &[u8],
        config: &RepositoryConfig,
    ) -> UvsResult<Self> {
        config.validate()?;
        match (config.fingerprint.algorithm, config.cipher) {
            (FingerprintAlgorithm::Blake3Keyed, CipherAlgorithm::Xchacha20poly1305) => {}
        }
        let master = derive_master_key(password, salt, &config.kdf)?;
        Self::from_master_key(&master, config.fingerprint.digest_len)
    }

    /// Build a context from an already derived master key.
    pub fn from_master_key(master: &MasterKey, digest_len: usize) -> UvsResult<Self> {
        if !(RepositoryConfig::MIN_DIGEST_LEN..=RepositoryConfig::MAX_DIGEST_LEN)
            .contains(&digest_len)
        {
            return Err(UvsError::Config(format!(
                "fingerprint digest length out of range: {digest_len}"
            )));
        }
        Ok(Self {
            keys: derive_subkeys(master)?,
            digest_len,
        })
    }

    pub fn digest_len(&self) -> usize {
        self.digest_len
    }

    /// Keyed fingerprint of `data`; used as every content-addressed id.
    pub fn fingerprint(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.fingerprint_hasher();
        hasher.update(data);
        self.finish(hasher)
    }

    /// Fingerprint of everything `reader` yields, without buffering it whole.
    pub fn fingerprint_reader<R: Read>(&self, mut reader: R) -> std::io::Result<ObjectId> {
        let mut hasher = self.fingerprint_hasher();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(self.finish(hasher))
    }

    fn fingerprint_hasher(&self) -> blake3::Hasher {
        blake3::Hasher::new_keyed(self.keys.fingerprint.as_bytes())
    }

    fn finish(&self, hasher: blake3::Hasher) -> ObjectId {
        let mut out = vec![0u8; self.digest_len];
        hasher.finalize_xof().fill(&mut out);
        ObjectId::from_bytes(&out)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> UvsResult<Vec<u8>> {
        encrypt_record(&self.keys.cipher, plaintext)
    }

    /// Fails with `TamperDetected` on any authentication failure.
    pub fn decrypt(&self, ciphertext: &[u8]) -> UvsResult<Vec<u8>> {
        decrypt_record(&self.keys.cipher, ciphertext)
    }

    /// Integrity tag for the unencrypted public document.
    pub fn mac(&self, data: &[u8]) -> String {
        blake3::keyed_hash(self.keys.mac.as_bytes(), data)
            .to_hex()
            .to_string()
    }

    /// Constant-time check of a tag produced by [`CryptoContext::mac`].
    pub fn verify_mac(&self, data: &[u8], tag: &str) -> bool {
        match blake3::Hash::from_hex(tag) {
            Ok(expected) => blake3::keyed_hash(self.keys.mac.as_bytes(), data) == expected,
            Err(_) => false,
        }
    }

    /// A fresh random snapshot id, shaped like a fingerprint.
    pub fn random_snapshot_id(&self) -> SnapshotId {
        let mut bytes = vec![0u8; self.digest_len];
        rand::thread_rng().fill_bytes(&mut bytes);
        ObjectId::from_bytes(&bytes)
    }
}
