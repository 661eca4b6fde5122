//! Content digests for shared files
//!
//! Peers advertise files with a SHA3-256 digest of the whole content so that
//! a requester can check what it received over the side channel.

use sha3::{Digest, Sha3_256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read buffer used when hashing files (64 KiB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Computes SHA3-256 of the input and returns it as a hex string
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hashes a file on disk without loading it into memory at once
pub fn file_digest(path: impl AsRef<Path>) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha3_256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_digest() {
        assert_eq!(
            digest(b""),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
        assert_eq!(
            digest(b"abc"),
            "3a985da74fe225b2045c172d6bd390bd855f086e3e9d525b46bfe24511431532"
        );
    }

    #[test]
    fn test_file_digest_matches_in_memory() {
        // Larger than one chunk so the loop runs more than once
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        assert_eq!(file_digest(file.path()).unwrap(), digest(&data));
    }

    #[test]
    fn test_file_digest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file_digest(dir.path().join("nope.bin")).is_err());
    }
}
