//! Runtime backend selection.

use tracing::info;
use uvs_core::config::StoreSettings;
use uvs_core::{ObjectId, ObjectKind, RepoLayout, UvsError, UvsResult};

use crate::fs::FsStore;
#[cfg(feature = "rocksdb")]
use crate::rocks::RocksDbStore;
use crate::{Document, ObjectStore};

/// Dispatch enum over the persistent backends.
pub enum StoreBackend {
    Fs(FsStore),
    #[cfg(feature = "rocksdb")]
    Rocks(RocksDbStore),
}

impl StoreBackend {
    /// Open the backend named in `settings` inside the repository's internal directory.
    pub fn open(settings: &StoreSettings, layout: &RepoLayout) -> UvsResult<Self> {
        match settings.backend.as_str() {
            "fs" => {
                info!(path = %layout.shadow_dir().display(), "using shadow directory store");
                Ok(StoreBackend::Fs(FsStore::open(&layout.shadow_dir())?))
            }
            #[cfg(feature = "rocksdb")]
            "rocksdb" => {
                info!(path = %layout.rocksdb_dir().display(), "using rocksdb store");
                Ok(StoreBackend::Rocks(RocksDbStore::open(&layout.rocksdb_dir())?))
            }
            #[cfg(not(feature = "rocksdb"))]
            "rocksdb" => Err(UvsError::Config(
                "rocksdb backend not compiled in (missing 'rocksdb' feature)".into(),
            )),
            other => Err(UvsError::Config(format!("unknown store backend '{other}'"))),
        }
    }

    fn inner(&self) -> &dyn ObjectStore {
        match self {
            StoreBackend::Fs(s) => s,
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ObjectStore {
        match self {
            StoreBackend::Fs(s) => s,
            #[cfg(feature = "rocksdb")]
            StoreBackend::Rocks(s) => s,
        }
    }
}

impl ObjectStore for StoreBackend {
    fn add(&mut self, kind: ObjectKind, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.inner_mut().add(kind, id, bytes)
    }

    fn get(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.inner().get(kind, id)
    }

    fn contains(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<bool> {
        self.inner().contains(kind, id)
    }

    fn list(&self, kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        self.inner().list(kind)
    }

    fn count(&self, kind: ObjectKind) -> UvsResult<usize> {
        self.inner().count(kind)
    }

    fn get_document(&self, doc: Document) -> UvsResult<Option<Vec<u8>>> {
        self.inner().get_document(doc)
    }

    fn put_document(&mut self, doc: Document, bytes: &[u8]) -> UvsResult<()> {
        self.inner_mut().put_document(doc, bytes)
    }
}
