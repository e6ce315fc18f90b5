//! # Hasher Module
//!
//! Content digests of image files.
//!
//! A digest identifies a file's exact bytes. The registry stores one per
//! record, and two records with equal digests are known to be identical
//! without decoding either image.
//!
//! ## Example
//! ```rust,ignore
//! use similar_image_finder::core::hasher::{ContentHasher, Xxh3Hasher};
//!
//! let digest = Xxh3Hasher.digest_file(&path)?;
//! ```

mod file_bytes;

pub use file_bytes::{read_file_bytes, FileBytes};

use crate::error::FileAccessError;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Deterministic digest of file contents: same bytes, same digest.
pub trait ContentHasher: Send + Sync {
    /// Digest a byte slice
    fn digest(&self, bytes: &[u8]) -> String;

    /// Read a file and digest its contents
    fn digest_file(&self, path: &Path) -> Result<String, FileAccessError> {
        let bytes = read_file_bytes(path)?;
        Ok(self.digest(&bytes))
    }
}

/// 128-bit xxh3 digest rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh3Hasher;

impl ContentHasher for Xxh3Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        format!("{:032x}", xxh3_128(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn same_bytes_same_digest() {
        let hasher = Xxh3Hasher;
        assert_eq!(hasher.digest(b"pixels"), hasher.digest(b"pixels"));
        assert_ne!(hasher.digest(b"pixels"), hasher.digest(b"pixelz"));
    }

    #[test]
    fn digest_is_fixed_width_hex() {
        let digest = Xxh3Hasher.digest(b"");
        assert_eq!(digest.len(), 32);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_file_matches_digest_of_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.png");
        std::fs::write(&path, b"not really a png").unwrap();

        let hasher = Xxh3Hasher;
        assert_eq!(
            hasher.digest_file(&path).unwrap(),
            hasher.digest(b"not really a png")
        );
    }
}
