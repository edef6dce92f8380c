//! uvs-store: the persistence contract consumed by the repository core
//!
//! An [`ObjectStore`] keeps opaque byte values for four content record kinds
//! (segments, files, trees, snapshots) plus a few named documents. It knows
//! nothing about cryptography. Inserting an id that already exists is a
//! silent no-op, so two commits producing the same object never conflict.
//!
//! Backends:
//!   - [`MemoryStore`]: in-process maps, for tests and dry runs
//!   - [`FsStore`] (default): one file per object in the shadow directory
//!   - [`DiscardStore`]: drops every write; used for side-effect-free tree ids
//!   - `RocksDbStore` (behind the `rocksdb` feature)

pub mod backend;
pub mod discard;
pub mod fs;
pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use backend::StoreBackend;
pub use discard::DiscardStore;
pub use fs::FsStore;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksDbStore;

use uvs_core::{ObjectId, ObjectKind, UvsResult};

/// Mutable named documents, each overwritten as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Document {
    /// Plaintext bootstrap document (salt + repository config)
    Public,
    /// MAC tag over the public document
    PublicMac,
    /// Encrypted branch and head pointers
    References,
}

impl Document {
    pub fn name(&self) -> &'static str {
        match self {
            Document::Public => "public.json",
            Document::PublicMac => "public.mac",
            Document::References => "references",
        }
    }
}

/// Key-value persistence for repository records.
///
/// Implementors provide the generic core; the named operations are
/// provided on top of it.
pub trait ObjectStore {
    /// Insert `bytes` under `id` unless `id` is already present.
    fn add(&mut self, kind: ObjectKind, id: &ObjectId, bytes: &[u8]) -> UvsResult<()>;
    fn get(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Option<Vec<u8>>>;
    /// All records of one kind, ordered by id.
    fn list(&self, kind: ObjectKind) -> UvsResult<Vec<(ObjectId, Vec<u8>)>>;
    fn get_document(&self, doc: Document) -> UvsResult<Option<Vec<u8>>>;
    fn put_document(&mut self, doc: Document, bytes: &[u8]) -> UvsResult<()>;

    fn contains(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<bool> {
        Ok(self.get(kind, id)?.is_some())
    }

    fn count(&self, kind: ObjectKind) -> UvsResult<usize> {
        Ok(self.list(kind)?.len())
    }

    /// False for stores that throw writes away; callers may then skip
    /// producing ciphertext at all.
    fn persists(&self) -> bool {
        true
    }

    fn add_segment(&mut self, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.add(ObjectKind::Segment, id, bytes)
    }

    fn get_segment(&self, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.get(ObjectKind::Segment, id)
    }

    fn add_file(&mut self, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.add(ObjectKind::File, id, bytes)
    }

    fn get_file(&self, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.get(ObjectKind::File, id)
    }

    fn add_tree(&mut self, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.add(ObjectKind::Tree, id, bytes)
    }

    fn get_tree(&self, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.get(ObjectKind::Tree, id)
    }

    fn add_snapshot(&mut self, id: &ObjectId, bytes: &[u8]) -> UvsResult<()> {
        self.add(ObjectKind::Snapshot, id, bytes)
    }

    fn get_snapshot(&self, id: &ObjectId) -> UvsResult<Option<Vec<u8>>> {
        self.get(ObjectKind::Snapshot, id)
    }

    /// Every stored snapshot as `(id, ciphertext)`.
    fn get_all_snapshots(&self) -> UvsResult<Vec<(ObjectId, Vec<u8>)>> {
        self.list(ObjectKind::Snapshot)
    }

    fn get_snapshot_count(&self) -> UvsResult<usize> {
        self.count(ObjectKind::Snapshot)
    }

    /// The public document and its MAC tag, if the repository was initialized.
    fn get_public_document(&self) -> UvsResult<Option<(Vec<u8>, String)>> {
        let doc = match self.get_document(Document::Public)? {
            Some(doc) => doc,
            None => return Ok(None),
        };
        let tag = match self.get_document(Document::PublicMac)? {
            Some(tag) => String::from_utf8_lossy(&tag).trim().to_string(),
            None => return Ok(None),
        };
        Ok(Some((doc, tag)))
    }

    fn set_public_document(&mut self, doc: &[u8], tag: &str) -> UvsResult<()> {
        self.put_document(Document::PublicMac, tag.as_bytes())?;
        self.put_document(Document::Public, doc)
    }

    fn get_reference_document(&self) -> UvsResult<Option<Vec<u8>>> {
        self.get_document(Document::References)
    }

    fn update_reference_document(&mut self, bytes: &[u8]) -> UvsResult<()> {
        self.put_document(Document::References, bytes)
    }
}
