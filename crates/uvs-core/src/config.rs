use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{IoResultExt, UvsError, UvsResult};

/// Local settings (loaded from `.uvs/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UvsConfig {
    pub repository: RepositorySettings,
    pub store: StoreSettings,
    pub crypto: CryptoSettings,
    pub segments: SegmentSettings,
    pub merge: MergeSettings,
    pub log: LogSettings,
}

impl UvsConfig {
    /// Read settings from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> UvsResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).at_path(path)?;
        toml::from_str(&content)
            .map_err(|e| UvsError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn to_toml(&self) -> UvsResult<String> {
        toml::to_string_pretty(self).map_err(|e| UvsError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    /// Branch created by `init` (default: master)
    pub default_branch: String,
    /// Glob patterns on entry names that are never snapshotted
    pub exclude_patterns: Vec<String>,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            default_branch: "master".into(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Object store backend: "fs" or "rocksdb"
    pub backend: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: "fs".into(),
        }
    }
}

/// Key derivation and fingerprint settings, applied only at `init`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSettings {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Fingerprint digest size in bytes (default: 32)
    pub digest_len: usize,
}

impl Default for CryptoSettings {
    fn default() -> Self {
        let kdf = KdfConfig::default();
        Self {
            argon2_mem_cost_kib: kdf.mem_cost_kib,
            argon2_time_cost: kdf.time_cost,
            argon2_parallelism: kdf.parallelism,
            digest_len: FingerprintConfig::default().digest_len,
        }
    }
}

/// Segment size targets, applied only at `init`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentSettings {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl Default for SegmentSettings {
    fn default() -> Self {
        let s = SegmentConfig::default();
        Self {
            min_size: s.min_size,
            avg_size: s.avg_size,
            max_size: s.max_size,
        }
    }
}

/// External three-way file merge tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeSettings {
    /// Program invoked as `<program> <args...> ours ancestor theirs`
    pub program: String,
    pub args: Vec<String>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            program: "diff3".into(),
            args: vec!["-m".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

// ── Persisted repository configuration ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KdfAlgorithm {
    Argon2id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintAlgorithm {
    Blake3Keyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherAlgorithm {
    Xchacha20poly1305,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfConfig {
    pub algorithm: KdfAlgorithm,
    pub mem_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    pub algorithm: FingerprintAlgorithm,
    /// Digest size in bytes; ids are twice as many hex characters
    pub digest_len: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            algorithm: FingerprintAlgorithm::Blake3Keyed,
            digest_len: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_size: 2 * 1024,
            avg_size: 4 * 1024,
            max_size: 8 * 1024,
        }
    }
}

/// Algorithm choices and parameters of one repository.
///
/// Fixed at `init` and stored in the public document, so a repository
/// describes itself and nothing here depends on local settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub kdf: KdfConfig,
    pub fingerprint: FingerprintConfig,
    pub cipher: CipherAlgorithm,
    pub segments: SegmentConfig,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            kdf: KdfConfig::default(),
            fingerprint: FingerprintConfig::default(),
            cipher: CipherAlgorithm::Xchacha20poly1305,
            segments: SegmentConfig::default(),
        }
    }
}

impl RepositoryConfig {
    pub const MIN_DIGEST_LEN: usize = 16;
    pub const MAX_DIGEST_LEN: usize = 64;
    pub const MAX_MEM_COST_KIB: u32 = 4 * 1024 * 1024;
    pub const MAX_TIME_COST: u32 = 64;
    pub const MAX_PARALLELISM: u32 = 64;

    pub fn from_settings(settings: &UvsConfig) -> Self {
        Self {
            kdf: KdfConfig {
                algorithm: KdfAlgorithm::Argon2id,
                mem_cost_kib: settings.crypto.argon2_mem_cost_kib,
                time_cost: settings.crypto.argon2_time_cost,
                parallelism: settings.crypto.argon2_parallelism,
            },
            fingerprint: FingerprintConfig {
                algorithm: FingerprintAlgorithm::Blake3Keyed,
                digest_len: settings.crypto.digest_len,
            },
            cipher: CipherAlgorithm::Xchacha20poly1305,
            segments: SegmentConfig {
                min_size: settings.segments.min_size,
                avg_size: settings.segments.avg_size,
                max_size: settings.segments.max_size,
            },
        }
    }

    /// Check parameter bounds before any key derivation work is done.
    pub fn validate(&self) -> UvsResult<()> {
        let bad = |msg: String| Err(UvsError::InvalidRepository(msg));

        let kdf = &self.kdf;
        // Checked first: the memory bound below scales with it
        if kdf.parallelism == 0 || kdf.parallelism > Self::MAX_PARALLELISM {
            return bad(format!("argon2 parallelism out of range: {}", kdf.parallelism));
        }
        if kdf.mem_cost_kib < kdf.parallelism.saturating_mul(8)
            || kdf.mem_cost_kib > Self::MAX_MEM_COST_KIB
        {
            return bad(format!("argon2 memory cost out of range: {} KiB", kdf.mem_cost_kib));
        }
        if kdf.time_cost == 0 || kdf.time_cost > Self::MAX_TIME_COST {
            return bad(format!("argon2 time cost out of range: {}", kdf.time_cost));
        }

        let len = self.fingerprint.digest_len;
        if !(Self::MIN_DIGEST_LEN..=Self::MAX_DIGEST_LEN).contains(&len) {
            return bad(format!("fingerprint digest length out of range: {len}"));
        }

        // FastCDC v2020 bounds
        let s = &self.segments;
        if !(64..=1_048_576).contains(&s.min_size)
            || !(256..=4_194_304).contains(&s.avg_size)
            || !(1024..=16_777_216).contains(&s.max_size)
            || s.min_size > s.avg_size
            || s.avg_size > s.max_size
        {
            return bad(format!(
                "segment sizes out of range: min {} avg {} max {}",
                s.min_size, s.avg_size, s.max_size
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[repository]
default_branch = "main"
exclude_patterns = ["*.tmp", "target"]

[store]
backend = "rocksdb"

[crypto]
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8
digest_len = 48

[segments]
min_size = 1024
avg_size = 2048
max_size = 4096

[merge]
program = "/usr/bin/diff3"
args = ["-m", "-E"]

[log]
level = "debug"
format = "json"
"#;
        let config: UvsConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.repository.default_branch, "main");
        assert_eq!(config.repository.exclude_patterns, vec!["*.tmp", "target"]);
        assert_eq!(config.store.backend, "rocksdb");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.crypto.digest_len, 48);
        assert_eq!(config.segments.max_size, 4096);
        assert_eq!(config.merge.program, "/usr/bin/diff3");
        assert_eq!(config.merge.args, vec!["-m", "-E"]);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: UvsConfig = toml::from_str("").unwrap();

        assert_eq!(config.repository.default_branch, "master");
        assert!(config.repository.exclude_patterns.is_empty());
        assert_eq!(config.store.backend, "fs");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert_eq!(config.crypto.digest_len, 32);
        assert_eq!(config.segments.avg_size, 4096);
        assert_eq!(config.segments.max_size, 8192);
        assert_eq!(config.merge.program, "diff3");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[crypto]
digest_len = 20
"#;
        let config: UvsConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.crypto.digest_len, 20);
        // Defaults
        assert_eq!(config.crypto.argon2_time_cost, 3);
        assert_eq!(config.repository.default_branch, "master");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = UvsConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed: UvsConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.repository.default_branch, parsed.repository.default_branch);
        assert_eq!(config.store.backend, parsed.store.backend);
        assert_eq!(config.merge.args, parsed.merge.args);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = UvsConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.backend, "fs");
    }

    #[test]
    fn load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[crypto\ndigest_len = ").unwrap();
        assert!(matches!(UvsConfig::load(&path), Err(UvsError::Config(_))));
    }

    #[test]
    fn repository_config_defaults_validate() {
        RepositoryConfig::default().validate().unwrap();
        RepositoryConfig::from_settings(&UvsConfig::default())
            .validate()
            .unwrap();
    }

    #[test]
    fn repository_config_rejects_out_of_range() {
        let mut cfg = RepositoryConfig::default();
        cfg.fingerprint.digest_len = 8;
        assert!(cfg.validate().is_err());

        let mut cfg = RepositoryConfig::default();
        cfg.kdf.mem_cost_kib = u32::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = RepositoryConfig::default();
        cfg.segments.min_size = 16 * 1024;
        assert!(cfg.validate().is_err(), "min above avg must be rejected");
    }

    #[test]
    fn huge_parallelism_is_rejected_not_overflowed() {
        for parallelism in [1u32 << 29, u32::MAX] {
            let mut cfg = RepositoryConfig::default();
            cfg.kdf.parallelism = parallelism;
            assert!(matches!(cfg.validate(), Err(UvsError::InvalidRepository(_))));
        }
    }

    #[test]
    fn repository_config_json_is_self_describing() {
        let json = serde_json::to_string(&RepositoryConfig::default()).unwrap();
        assert!(json.contains("\"argon2id\""));
        assert!(json.contains("\"blake3_keyed\""));
        assert!(json.contains("\"xchacha20poly1305\""));

        let tampered = json.replace("argon2id", "pbkdf2");
        assert!(serde_json::from_str::<RepositoryConfig>(&tampered).is_err());
    }
}
