use std::collections::BTreeMap;

use uvs_core::{ObjectId, ObjectKind, UvsResult};

use crate::{Document, ObjectStore};

/// In-memory object store. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: BTreeMap<(ObjectKind, ObjectId), Vec<u8>>,
    documents: BTreeMap<Document, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored content records across all kinds.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

impl ObjectStore for MemoryStore {
    fn add(&mut self, kind: ObjectKind, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.objects
            .entry((kind, id.clone()))
            .or_insert_with(|| bytes.to_vec());
        Ok(())
    }

    fn get(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        Ok(self.objects.get(&(kind, id.clone())).cloned())
    }

    fn contains(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<bool> {
        Ok(self.objects.contains_key(&(kind, id.clone())))
    }

    fn list(&self, kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        Ok(self
            .objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), v)| (id.clone(), v.clone()))
            .collect())
    }

    fn count(&self, kind: ObjectKind) -> UvsResult<usize> {
        Ok(self.objects.keys().filter(|(k, _)| *k == kind).count())
    }

    fn get_document(&self, doc: Document) -> UvsResult<Option<Vec<u8>>> {
        Ok(self.documents.get(&doc).cloned())
    }

    fn put_document(&mut self, doc: Document, bytes: &[u8]) -> UvsResult<()> {
        self.documents.insert(doc, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract;

    #[test]
    fn memory_store_contract() {
        contract::run_all(&mut || Box::new(MemoryStore::new()) as Box<dyn ObjectStore>);
    }

    #[test]
    fn object_count_spans_kinds() {
        let mut store = MemoryStore::new();
        store.add_segment(&contract::id(1), b"s").unwrap();
        store.add_tree(&contract::id(1), b"t").unwrap();
        assert_eq!(store.object_count(), 2);
        assert_eq!(store.count(ObjectKind::Tree).unwrap(), 1);
    }
}
