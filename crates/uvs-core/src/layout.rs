//! On-disk layout of a repository working directory.
//!
//! ```text
//! <root>/
//!   .uvs/
//!     config.toml         effective settings written by `init`
//!     shadow/             ciphertext-only object store (fs backend)
//!     rocksdb/            object store (rocksdb backend)
//!     temp/
//!       merge_result/     output of the last prepared merge
//!       ongoing_merge.json
//!   ...user files...
//! ```

use std::path::{Path, PathBuf};

/// Name of the internal directory at the working directory root.
pub const INTERNAL_DIR: &str = ".uvs";

/// Reference name that always resolves to the current head.
pub const HEAD_REF: &str = "head";

#[derive(Debug, Clone)]
pub struct RepoLayout {
    root: PathBuf,
}

impl RepoLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn internal_dir(&self) -> PathBuf {
        self.root.join(INTERNAL_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.internal_dir().join("config.toml")
    }

    pub fn shadow_dir(&self) -> PathBuf {
        self.internal_dir().join("shadow")
    }

    pub fn rocksdb_dir(&self) -> PathBuf {
        self.internal_dir().join("rocksdb")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.internal_dir().join("temp")
    }

    pub fn merge_result_dir(&self) -> PathBuf {
        self.temp_dir().join("merge_result")
    }

    pub fn pending_merge_path(&self) -> PathBuf {
        self.temp_dir().join("ongoing_merge.json")
    }

    /// True for entry names at the root that belong to the repository itself.
    pub fn is_internal_name(name: &str) -> bool {
        name == INTERNAL_DIR
    }
}
