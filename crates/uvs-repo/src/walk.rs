//! Post-order directory walk that turns a working tree into records.
//!
//! Files are split into content-defined segments; segments, file records
//! and tree records are fingerprinted, encrypted and handed to the store.
//! Against a store that does not persist, the walk skips encryption and
//! only computes ids.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use uvs_chunks::segment_data;
use uvs_core::config::SegmentConfig;
use uvs_core::{IoResultExt, ObjectId, ObjectKind, RepoLayout, UvsResult};
use uvs_crypto::CryptoContext;
use uvs_store::ObjectStore;

use crate::records::{encode, valid_entry_name, FileRecord, SegmentRef, TreeEntry, TreeRecord};

/// Which directory entries are never snapshotted.
#[derive(Debug, Clone)]
pub struct WalkFilter {
    root: PathBuf,
    excludes: Vec<glob::Pattern>,
}

impl WalkFilter {
    /// Invalid glob patterns are logged and ignored.
    pub fn new(root: &Path, exclude_patterns: &[String]) -> Self {
        let excludes = exclude_patterns
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, "ignoring invalid exclude pattern: {e}");
                    None
                }
            })
            .collect();
        // Walks compare against the canonical root; an unresolvable root
        // is kept as given
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        Self { root, excludes }
    }

    /// True if the entry `name` inside `dir` is left out.
    pub fn skips(&self, dir: &Path, name: &str) -> bool {
        if dir == self.root && RepoLayout::is_internal_name(name) {
            return true;
        }
        self.excludes.iter().any(|p| p.matches(name))
    }
}

/// Counters for one walk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
    pub skipped: usize,
}

pub(crate) struct TreeBuilder<'a> {
    crypto: &'a CryptoContext,
    store: &'a mut dyn ObjectStore,
    filter: &'a WalkFilter,
    segments: SegmentConfig,
    pub stats: WalkStats,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(
        crypto: &'a CryptoContext,
        store: &'a mut dyn ObjectStore,
        filter: &'a WalkFilter,
        segments: SegmentConfig,
    ) -> Self {
        Self {
            crypto,
            store,
            filter,
            segments,
            stats: WalkStats::default(),
        }
    }

    /// Store everything under `dir` and return its tree id.
    pub fn build(&mut self, dir: &Path) -> UvsResult<ObjectId> {
        let dir = std::fs::canonicalize(dir).at_path(dir)?;
        self.build_dir(&dir)
    }

    fn build_dir(&mut self, dir: &Path) -> UvsResult<ObjectId> {
        let mut files = Vec::new();
        let mut subtrees = Vec::new();

        for entry in std::fs::read_dir(dir).at_path(dir)? {
            let entry = entry.at_path(dir)?;
            let path = entry.path();
            let name = match entry.file_name().into_string() {
                Ok(name) if valid_entry_name(&name) => name,
                _ => {
                    warn!(path = %path.display(), "skipping entry with unsupported name");
                    self.stats.skipped += 1;
                    continue;
                }
            };
            if self.filter.skips(dir, &name) {
                continue;
            }

            let file_type = entry.file_type().at_path(&path)?;
            if file_type.is_dir() {
                let id = self.build_dir(&path)?;
                subtrees.push(TreeEntry { name, id });
            } else if file_type.is_file() {
                let id = self.store_file(&path)?;
                files.push(TreeEntry { name, id });
            } else {
                // Symlinks and special files are not versioned
                warn!(path = %path.display(), "skipping non-regular entry");
                self.stats.skipped += 1;
            }
        }

        let tree = TreeRecord::new(files, subtrees);
        let plaintext = encode(&tree)?;
        let id = self.crypto.fingerprint(&plaintext);
        self.put(ObjectKind::Tree, &id, &plaintext)?;
        self.stats.dirs += 1;
        debug!(dir = %dir.display(), id = %id.short(), "tree built");
        Ok(id)
    }

    fn store_file(&mut self, path: &Path) -> UvsResult<ObjectId> {
        let data = std::fs::read(path).at_path(path)?;
        let file_id = self.crypto.fingerprint(&data);
        self.stats.files += 1;
        self.stats.bytes += data.len() as u64;

        // A stored file record implies all of its segments are stored
        if self.store.persists() && self.store.contains(ObjectKind::File, &file_id)? {
            debug!(path = %path.display(), "dedup: file already stored");
            return Ok(file_id);
        }

        let mut segments = Vec::new();
        for seg in segment_data(&data, &self.segments) {
            let bytes = seg.slice(&data);
            let id = self.crypto.fingerprint(bytes);
            self.put(ObjectKind::Segment, &id, bytes)?;
            segments.push(SegmentRef {
                id,
                offset: seg.offset,
                length: seg.length as u64,
            });
        }

        let record = FileRecord {
            verify_id: file_id.clone(),
            size: data.len() as u64,
            segments,
        };
        self.put(ObjectKind::File, &file_id, &encode(&record)?)?;
        Ok(file_id)
    }

    fn put(&mut self, kind: ObjectKind, id: &ObjectId, plaintext: &[u8]) -> UvsResult<()> {
        if !self.store.persists() || self.store.contains(kind, id)? {
            return Ok(());
        }
        let ciphertext = self.crypto.encrypt(plaintext)?;
        self.store.add(kind, id, &ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_dir_is_skipped_only_at_root() {
        let filter = WalkFilter::new(Path::new("/work"), &[]);
        assert!(filter.skips(Path::new("/work"), ".uvs"));
        assert!(!filter.skips(Path::new("/work/sub"), ".uvs"));
        assert!(!filter.skips(Path::new("/work"), "src"));
    }

    #[test]
    fn root_is_matched_whatever_its_spelling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let filter = WalkFilter::new(&dir.path().join("sub").join(".."), &[]);
        let canonical = std::fs::canonicalize(dir.path()).unwrap();
        assert!(filter.skips(&canonical, ".uvs"));
    }

    #[test]
    fn exclude_patterns_match_names_at_any_depth() {
        let filter = WalkFilter::new(
            Path::new("/work"),
            &["*.tmp".to_string(), "target".to_string(), "[".to_string()],
        );
        assert!(filter.skips(Path::new("/work"), "scratch.tmp"));
        assert!(filter.skips(Path::new("/work/a/b"), "target"));
        assert!(!filter.skips(Path::new("/work"), "main.rs"));
    }
}
