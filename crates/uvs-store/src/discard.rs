use uvs_core::{ObjectId, ObjectKind, UvsResult};

use crate::{Document, ObjectStore};

/// Null-object store: accepts every write and keeps nothing.
///
/// Walking a directory against this store yields the same tree id a real
/// commit would, with no persistence side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardStore;

impl ObjectStore for DiscardStore {
    fn add(&mut self, _kind: ObjectKind, _id: &ObjectId, _bytes: &[u8]) -> UvsResult<()> {
        Ok(())
    }

    fn get(&self, _kind: ObjectKind, _id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn list(&self, _kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        Ok(Vec::new())
    }

    fn get_document(&self, _doc: Document) -> UvsResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put_document(&mut self, _doc: Document, _bytes: &[u8]) -> UvsResult<()> {
        Ok(())
    }

    fn persists(&self) -> bool {
        false
    }
}
