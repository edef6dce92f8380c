//! Unkeyed BLAKE3 comparison of local files
//!
//! Only used on plaintext scratch checkouts during a merge, to spot sides
//! that are identical or unchanged. Results are never written to the store.

use std::io::Read;
use std::path::Path;

use uvs_core::{IoResultExt, UvsResult};

/// Hash a file using the streaming interface.
pub fn hash_file_streaming(path: &Path) -> UvsResult<blake3::Hash> {
    let mut file = std::fs::File::open(path).at_path(path)?;

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer

    loop {
        let n = file.read(&mut buf).at_path(path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

/// True when both files hold the same bytes.
pub fn files_identical(a: &Path, b: &Path) -> UvsResult<bool> {
    let len_a = std::fs::metadata(a).at_path(a)?.len();
    let len_b = std::fs::metadata(b).at_path(b)?.len();
    if len_a != len_b {
        return Ok(false);
    }
    Ok(hash_file_streaming(a)? == hash_file_streaming(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn write(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, data).unwrap();
        p
    }

    #[test]
    fn streaming_hash_matches_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0x5Au8; 200 * 1024];
        let p = write(dir.path(), "big", &data);
        assert_eq!(hash_file_streaming(&p).unwrap(), blake3::hash(&data));
    }

    #[test]
    fn identical_and_different_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a", b"same content\n");
        let b = write(dir.path(), "b", b"same content\n");
        let c = write(dir.path(), "c", b"other content\n");
        let d = write(dir.path(), "d", b"same contenT\n");

        assert!(files_identical(&a, &b).unwrap());
        assert!(!files_identical(&a, &c).unwrap());
        assert!(!files_identical(&a, &d).unwrap());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a", b"x");
        assert!(files_identical(&a, &dir.path().join("nope")).is_err());
    }

    proptest! {
        #[test]
        fn identical_iff_equal_bytes(
            x in proptest::collection::vec(any::<u8>(), 0..=512),
            y in proptest::collection::vec(any::<u8>(), 0..=512),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let a = write(dir.path(), "x", &x);
            let b = write(dir.path(), "y", &y);
            prop_assert_eq!(files_identical(&a, &b).unwrap(), x == y);
        }
    }
}
