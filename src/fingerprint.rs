//! Content fingerprints.
//!
//! A fingerprint is the xxh64 digest (seed 0) of a file's bytes. It is an
//! identity and dedup signal only and offers no resistance to deliberate
//! collisions. A non-zero fingerprint is what marks a metadata leaf as
//! readable, so a raw digest of 0 is reported as 1.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use xxhash_rust::xxh64::{xxh64, Xxh64};

const SEED: u64 = 0;
const BLOCK: usize = 64 * 1024;

/// Fingerprint of an in-memory byte slice.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    non_zero(xxh64(bytes, SEED))
}

/// Fingerprint of everything `reader` yields, streamed in fixed blocks.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<u64> {
    let mut hasher = Xxh64::new(SEED);
    let mut buf = vec![0u8; BLOCK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(non_zero(hasher.digest()))
}

/// Fingerprint of the file at `path`.
pub fn hash_file(path: &Path) -> io::Result<u64> {
    hash_reader(File::open(path)?)
}

fn non_zero(digest: u64) -> u64 {
    if digest == 0 {
        1
    } else {
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_same_bytes_same_fingerprint() {
        let a = hash_bytes(b"alice@example.com\n");
        let b = hash_bytes(b"alice@example.com\n");
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_byte_change_changes_fingerprint() {
        let base = b"0123456789abcdef".to_vec();
        let original = hash_bytes(&base);
        for i in 0..base.len() {
            let mut flipped = base.clone();
            flipped[i] ^= 0x01;
            assert_ne!(hash_bytes(&flipped), original, "byte {} flip collided", i);
        }
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(hash_bytes(b"ab"), hash_bytes(b"ba"));
    }

    #[test]
    fn test_empty_input_is_non_zero() {
        assert_ne!(hash_bytes(b""), 0);
    }

    #[test]
    fn test_reader_matches_slice_across_blocks() {
        let data: Vec<u8> = (0..(BLOCK * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = hash_reader(Cursor::new(&data)).unwrap();
        assert_eq!(streamed, hash_bytes(&data));
    }

    #[test]
    fn test_file_matches_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leak.txt");
        std::fs::write(&path, b"user:pass\n").unwrap();
        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"user:pass\n"));
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("nope")).is_err());
    }
}
