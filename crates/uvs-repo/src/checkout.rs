//! Writing a stored tree back out to a directory.
//!
//! Each file is assembled in a temp file next to its destination, checked
//! against its fingerprint and only then renamed into place, so a failed
//! or tampered checkout never leaves a half-written file under its real name.

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

use uvs_core::{IoResultExt, ObjectId, RepoLayout, UvsError, UvsResult};

use crate::objects::ObjectReader;

pub(crate) struct Materializer<'a> {
    reader: ObjectReader<'a>,
    pub files_written: usize,
}

impl<'a> Materializer<'a> {
    pub fn new(reader: ObjectReader<'a>) -> Self {
        Self {
            reader,
            files_written: 0,
        }
    }

    /// Write the tree `tree_id` into the existing directory `dest`.
    pub fn write_tree(&mut self, tree_id: &ObjectId, dest: &Path) -> UvsResult<()> {
        let tree = self.reader.tree(tree_id)?;

        for entry in &tree.subtrees {
            let path = dest.join(&entry.name);
            match std::fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(UvsError::InvalidDestination(path)),
                Err(_) => std::fs::create_dir(&path).at_path(&path)?,
            }
            self.write_tree(&entry.id, &path)?;
        }

        for entry in &tree.files {
            self.write_file(&entry.id, &dest.join(&entry.name))?;
        }
        Ok(())
    }

    fn write_file(&mut self, file_id: &ObjectId, target: &Path) -> UvsResult<()> {
        if target.is_dir() {
            return Err(UvsError::InvalidDestination(target.to_path_buf()));
        }
        let record = self.reader.file(file_id)?;
        let dir = target
            .parent()
            .ok_or_else(|| UvsError::InvalidDestination(target.to_path_buf()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".uvs-tmp-")
            .tempfile_in(dir)
            .at_path(dir)?;
        for seg in &record.segments {
            let data = self.reader.segment(&seg.id)?;
            if data.len() as u64 != seg.length {
                return Err(UvsError::InvalidFile(format!(
                    "segment {} is {} bytes, record says {}",
                    seg.id,
                    data.len(),
                    seg.length
                )));
            }
            tmp.seek(SeekFrom::Start(seg.offset)).at_path(tmp.path())?;
            tmp.write_all(&data).at_path(tmp.path())?;
        }
        tmp.flush().at_path(tmp.path())?;

        tmp.rewind().at_path(tmp.path())?;
        let written = self
            .reader
            .crypto
            .fingerprint_reader(&mut tmp)
            .at_path(target)?;
        if written != *file_id {
            return Err(UvsError::TamperDetected);
        }

        tmp.persist(target)
            .map_err(|e| UvsError::io(target, e.error))?;
        self.files_written += 1;
        debug!(path = %target.display(), bytes = record.size, "file restored");
        Ok(())
    }
}

/// Remove everything in `dest` except the repository's internal directory.
pub(crate) fn clear_directory(dest: &Path) -> UvsResult<()> {
    for entry in std::fs::read_dir(dest).at_path(dest)? {
        let entry = entry.at_path(dest)?;
        if RepoLayout::is_internal_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        if entry.file_type().at_path(&path)?.is_dir() {
            std::fs::remove_dir_all(&path).at_path(&path)?;
        } else {
            std::fs::remove_file(&path).at_path(&path)?;
        }
    }
    Ok(())
}

/// Make sure `dest` can receive a checkout.
pub(crate) fn prepare_destination(dest: &Path, clear: bool) -> UvsResult<()> {
    match std::fs::metadata(dest) {
        Ok(meta) if !meta.is_dir() => {
            return Err(UvsError::InvalidDestination(dest.to_path_buf()))
        }
        Ok(_) => {}
        Err(_) => std::fs::create_dir_all(dest).at_path(dest)?,
    }
    if clear {
        clear_directory(dest)?;
    }
    Ok(())
}
