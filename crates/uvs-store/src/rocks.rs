//! RocksDB-backed object store.
//!
//! Keys are `<collection>/<id>` for records and `doc/<name>` for documents.
//! Writes go straight to RocksDB; its WAL provides durability.

use std::path::Path;
use tracing::debug;

use uvs_core::{ObjectId, ObjectKind, UvsError, UvsResult};

use crate::{Document, ObjectStore};

pub struct RocksDbStore {
    db: rocksdb::DB,
}

impl RocksDbStore {
    /// Open or create a RocksDB object store at the given path.
    pub fn open(db_path: &Path) -> UvsResult<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);

        let db = rocksdb::DB::open(&opts, db_path).map_err(|e| {
            UvsError::Storage(format!("opening RocksDB {}: {e}", db_path.display()))
        })?;
        debug!(path = %db_path.display(), "opened rocksdb store");
        Ok(Self { db })
    }

    fn object_key(kind: ObjectKind, id: &ObjectId) -> String {
        format!("{}/{}", kind.collection(), id)
    }

    fn document_key(doc: Document) -> String {
        format!("doc/{}", doc.name())
    }

    fn storage_err(e: rocksdb::Error) -> UvsError {
        UvsError::Storage(format!("rocksdb: {e}"))
    }
}

impl ObjectStore for RocksDbStore {
    fn add(&mut self, kind: ObjectKind, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        let key = Self::object_key(kind, id);
        if self.db.get_pinned(key.as_bytes()).map_err(Self::storage_err)?.is_some() {
            return Ok(());
        }
        self.db.put(key.as_bytes(), bytes).map_err(Self::storage_err)
    }

    fn get(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.db
            .get(Self::object_key(kind, id).as_bytes())
            .map_err(Self::storage_err)
    }

    fn list(&self, kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        let prefix = format!("{}/", kind.collection());
        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            prefix.as_bytes(),
            rocksdb::Direction::Forward,
        ));

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(Self::storage_err)?;
            let key = String::from_utf8_lossy(&key);
            let Some(id) = key.strip_prefix(&prefix) else {
                break;
            };
            out.push((ObjectId::parse(id)?, value.to_vec()));
        }
        Ok(out)
    }

    fn get_document(&self, doc: Document) -> UvsResult<Option<Vec<u8>>> {
        self.db
            .get(Self::document_key(doc).as_bytes())
            .map_err(Self::storage_err)
    }

    fn put_document(&mut self, doc: Document, bytes: &[u8]) -> UvsResult<()> {
        self.db
            .put(Self::document_key(doc).as_bytes(), bytes)
            .map_err(Self::storage_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn rocksdb_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut n = 0;
        contract::run_all(&mut || {
            n += 1;
            Box::new(RocksDbStore::open(&dir.path().join(format!("db{n}"))).unwrap())
                as Box<dyn ObjectStore>
        });
    }

    #[test]
    fn rocksdb_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = contract::id(4);
        {
            let mut store = RocksDbStore::open(dir.path()).unwrap();
            store.add_file(&id, b"file").unwrap();
        }
        let store = RocksDbStore::open(dir.path()).unwrap();
        assert_eq!(store.get_file(&id).unwrap().unwrap(), b"file");
        assert_eq!(store.count(ObjectKind::File).unwrap(), 1);
    }
}
