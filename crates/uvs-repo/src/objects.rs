//! Typed, verified reads of encrypted records.

use tracing::warn;

use uvs_core::{ObjectId, ObjectKind, SnapshotId, UvsError, UvsResult};
use uvs_crypto::CryptoContext;
use uvs_store::ObjectStore;

use crate::records::{decode, FileRecord, SnapshotRecord, TreeRecord};

/// Decrypts, decodes and checks records fetched from a store.
///
/// Any record whose content does not match the id it was stored under is
/// reported as `TamperDetected`.
pub(crate) struct ObjectReader<'a> {
    pub crypto: &'a CryptoContext,
    pub store: &'a dyn ObjectStore,
}

impl<'a> ObjectReader<'a> {
    pub fn new(crypto: &'a CryptoContext, store: &'a dyn ObjectStore) -> Self {
        Self { crypto, store }
    }

    fn plaintext(&self, kind: ObjectKind, id: &ObjectId) -> UvsResult<Vec<u8>> {
        let ciphertext = self
            .store
            .get(kind, id)?
            .ok_or_else(|| UvsError::not_found(kind, id))?;
        self.crypto.decrypt(&ciphertext).map_err(|e| {
            warn!(kind = %kind, id = %id.short(), "record failed authentication");
            e
        })
    }

    pub fn segment(&self, id: &ObjectId) -> UvsResult<Vec<u8>> {
        let data = self.plaintext(ObjectKind::Segment, id)?;
        if self.crypto.fingerprint(&data) != *id {
            warn!(id = %id.short(), "segment content does not match its id");
            return Err(UvsError::TamperDetected);
        }
        Ok(data)
    }

    pub fn file(&self, id: &ObjectId) -> UvsResult<FileRecord> {
        let record: FileRecord = decode(&self.plaintext(ObjectKind::File, id)?)?;
        if record.verify_id != *id {
            return Err(UvsError::TamperDetected);
        }
        Ok(record)
    }

    pub fn tree(&self, id: &ObjectId) -> UvsResult<TreeRecord> {
        let plaintext = self.plaintext(ObjectKind::Tree, id)?;
        if self.crypto.fingerprint(&plaintext) != *id {
            warn!(id = %id.short(), "tree content does not match its id");
            return Err(UvsError::TamperDetected);
        }
        decode(&plaintext)
    }

    pub fn snapshot(&self, id: &SnapshotId) -> UvsResult<SnapshotRecord> {
        let record: SnapshotRecord = decode(&self.plaintext(ObjectKind::Snapshot, id)?)?;
        Self::verify_snapshot(id, record)
    }

    /// Every snapshot in the store, each checked against its id.
    pub fn all_snapshots(&self) -> UvsResult<Vec<(SnapshotId, SnapshotRecord)>> {
        self.store
            .get_all_snapshots()?
            .into_iter()
            .map(|(id, ciphertext)| {
                let record: SnapshotRecord = decode(&self.crypto.decrypt(&ciphertext)?)?;
                Ok((id.clone(), Self::verify_snapshot(&id, record)?))
            })
            .collect()
    }

    fn verify_snapshot(id: &SnapshotId, record: SnapshotRecord) -> UvsResult<SnapshotRecord> {
        if record.verify_id != *id {
            warn!(id = %id.short(), "snapshot stored under a foreign id");
            return Err(UvsError::TamperDetected);
        }
        Ok(record)
    }
}
