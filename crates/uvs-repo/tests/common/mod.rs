//! Shared helpers for repository integration tests.

#![allow(dead_code)]

use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use uvs_core::UvsConfig;
use uvs_repo::{Author, Repository};

/// Settings with a deliberately weak KDF so tests stay fast.
pub fn settings() -> UvsConfig {
    let mut settings = UvsConfig::default();
    settings.crypto.argon2_mem_cost_kib = 1024;
    settings.crypto.argon2_time_cost = 1;
    settings.crypto.argon2_parallelism = 1;
    settings.crypto.digest_len = 16;
    settings
}

pub fn password() -> SecretString {
    SecretString::from("correct horse battery staple")
}

pub fn author() -> Author {
    Author::new("Test Author", "test@example.org")
}

pub struct Fixture {
    pub dir: TempDir,
    pub repo: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let repo = Repository::init(dir.path(), &password(), &settings()).expect("init");
        Self { dir, repo }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn write(&self, rel: &str, content: &str) {
        write_file(self.dir.path(), rel, content);
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).expect("read working file")
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.dir.path().join(rel).exists()
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.dir.path().join(rel)).expect("remove working file");
    }

    pub fn commit(&mut self, message: &str) -> uvs_core::SnapshotId {
        self.repo.take_snapshot(message, &author()).expect("snapshot")
    }

    pub fn reopen(self) -> Self {
        let Fixture { dir, repo } = self;
        drop(repo);
        let repo = Repository::open(dir.path(), &password(), &settings()).expect("reopen");
        Fixture { dir, repo }
    }
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, content).expect("write file");
}

/// Sorted relative paths of every file under `root`, skipping `.uvs`.
pub fn list_files(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).expect("read_dir") {
            let entry = entry.expect("dir entry");
            let path = entry.path();
            if dir == root && entry.file_name() == ".uvs" {
                continue;
            }
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).expect("under root");
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}

/// BLAKE3 over every path and file content under `dir`, for no-write checks.
pub fn digest_dir(dir: &Path) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    let mut stack = vec![dir.to_path_buf()];
    let mut files = Vec::new();
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d).expect("read_dir") {
            let path = entry.expect("dir entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    for path in files {
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update(&std::fs::read(&path).expect("read"));
    }
    hasher.finalize()
}
