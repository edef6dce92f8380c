//! Shadow-directory object store: one file per record.
//!
//! ```text
//! <root>/
//!   segments/ab/ab12...      ciphertext
//!   files/..  trees/..  snapshots/..
//!   public.json  public.mac  references
//! ```
//!
//! Every write goes to a randomly named temp file in the target directory and
//! is renamed into place, so a crash never leaves a partially written record.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use uvs_core::{IoResultExt, ObjectId, ObjectKind, UvsError, UvsResult};

use crate::{Document, ObjectStore};

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open or create a shadow directory at `root`.
    pub fn open(root: &Path) -> UvsResult<Self> {
        for kind in ObjectKind::ALL {
            let dir = root.join(kind.collection());
            std::fs::create_dir_all(&dir).at_path(&dir)?;
        }
        debug!(root = %root.display(), "opened shadow store");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, kind: ObjectKind, id: &ObjectId) -> PathBuf {
        self.root
            .join(kind.collection())
            .join(id.shard())
            .join(id.as_str())
    }

    fn document_path(&self, doc: Document) -> PathBuf {
        self.root.join(doc.name())
    }

    fn write_temp(dir: &Path, bytes: &[u8]) -> UvsResult<tempfile::NamedTempFile> {
        std::fs::create_dir_all(dir).at_path(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(dir)
            .at_path(dir)?;
        tmp.write_all(bytes).at_path(tmp.path())?;
        tmp.as_file().sync_all().at_path(tmp.path())?;
        Ok(tmp)
    }

    fn read_optional(path: &Path) -> UvsResult<Option<Vec<u8>>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UvsError::io(path, e)),
        }
    }
}

impl ObjectStore for FsStore {
    fn add(&mut self, kind: ObjectKind, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        let path = self.object_path(kind, id);
        if path.exists() {
            return Ok(());
        }
        let dir = path
            .parent()
            .ok_or_else(|| UvsError::Storage(format!("no parent for {}", path.display())))?;
        let tmp = Self::write_temp(dir, bytes)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(kind = %kind, id = %id.short(), bytes = bytes.len(), "stored");
                Ok(())
            }
            // Another writer got there first; the record is immutable so keep theirs.
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(UvsError::io(&path, e.error)),
        }
    }

    fn get(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        Self::read_optional(&self.object_path(kind, id))
    }

    fn contains(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<bool> {
        Ok(self.object_path(kind, id).is_file())
    }

    fn list(&self, kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        let dir = self.root.join(kind.collection());
        let mut out = Vec::new();
        for shard in std::fs::read_dir(&dir).at_path(&dir)? {
            let shard = shard.at_path(&dir)?;
            let shard_path = shard.path();
            if !shard_path.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(&shard_path).at_path(&shard_path)? {
                let entry = entry.at_path(&shard_path)?;
                let name = entry.file_name().to_string_lossy().into_owned();
                // Leftover temp files and foreign entries are not records
                let id = match ObjectId::parse(&name) {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(
                            path = %entry.path().display(),
                            "ignoring stray entry in shadow store"
                        );
                        continue;
                    }
                };
                let bytes = std::fs::read(entry.path()).at_path(&entry.path())?;
                out.push((id, bytes));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn count(&self, kind: ObjectKind) -> UvsResult<usize> {
        Ok(self.list(kind)?.len())
    }

    fn get_document(&self, doc: Document) -> UvsResult<Option<Vec<u8>>> {
        Self::read_optional(&self.document_path(doc))
    }

    fn put_document(&mut self, doc: Document, bytes: &[u8]) -> UvsResult<()> {
        let path = self.document_path(doc);
        let tmp = Self::write_temp(&self.root, bytes)?;
        tmp.persist(&path).map_err(|e| UvsError::io(&path, e.error))?;
        debug!(document = doc.name(), bytes = bytes.len(), "document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn fs_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut n = 0;
        contract::run_all(&mut || {
            n += 1;
            let store = FsStore::open(&dir.path().join(format!("s{n}"))).unwrap();
            Box::new(store) as Box<dyn ObjectStore>
        });
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = contract::id(7);
        {
            let mut store = FsStore::open(dir.path()).unwrap();
            store.add_snapshot(&id, b"snap").unwrap();
            store.update_reference_document(b"refs").unwrap();
        }
        let store = FsStore::open(dir.path()).unwrap();
        assert_eq!(store.get_snapshot(&id).unwrap().unwrap(), b"snap");
        assert_eq!(store.get_reference_document().unwrap().unwrap(), b"refs");
    }

    #[test]
    fn layout_is_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        let id = ObjectId::parse("abcdef0123456789").unwrap();
        store.add_tree(&id, b"t").unwrap();
        assert!(dir.path().join("trees/ab/abcdef0123456789").is_file());
    }

    #[test]
    fn stray_files_are_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsStore::open(dir.path()).unwrap();
        store.add_snapshot(&contract::id(1), b"one").unwrap();
        let shard = dir.path().join("snapshots").join(contract::id(1).shard());
        std::fs::write(shard.join(".tmp-leftover"), b"junk").unwrap();

        assert_eq!(store.get_snapshot_count().unwrap(), 1);
    }
}
