//! uvs-crypto: repository key hierarchy, keyed fingerprints and record encryption
//!
//! Key hierarchy:
//! ```text
//! Master Key (256-bit, Argon2id from password + 16-byte repository salt)
//!   ├── Fingerprint Key (HKDF-SHA256, domain="uvs-fingerprint")
//!   │   └── ids: BLAKE3 keyed XOF, digest_len bytes, lower-case hex
//!   ├── Cipher Key (HKDF-SHA256, domain="uvs-cipher")
//!   │   └── records: XChaCha20-Poly1305, random 192-bit nonce per call
//!   └── MAC Key (HKDF-SHA256, domain="uvs-public-mac")
//!       └── public document tag: BLAKE3 keyed hash
//! ```
//!
//! Fingerprints are keyed so that two repositories with different passwords
//! assign unrelated ids to identical content.

pub mod cipher;
pub mod context;
pub mod kdf;
pub mod keys;

pub use cipher::{decrypt_record, encrypt_record};
pub use context::{generate_salt, CryptoContext};
pub use kdf::{derive_master_key, MasterKey};
pub use keys::{derive_subkeys, SubKey, SubKeys};

/// Size of a master key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-repository KDF salt
pub const SALT_SIZE: usize = 16;
