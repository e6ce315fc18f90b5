//! Reading whole files, memory-mapped when they are large.

use crate::error::FileAccessError;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Files at least this large are memory-mapped instead of copied (1MB)
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Read a file's bytes, memory-mapping files of 1MB and more.
pub fn read_file_bytes(path: &Path) -> Result<FileBytes, FileAccessError> {
    let read_error = |source| FileAccessError::Read {
        path: path.to_path_buf(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(read_error)?;

    if metadata.len() >= MMAP_THRESHOLD {
        let file = File::open(path).map_err(read_error)?;
        // SAFETY: the map is read-only and owns its handle for its lifetime.
        // A concurrent writer truncating the file is outside what we support.
        let mmap = unsafe { Mmap::map(&file) }.map_err(read_error)?;
        Ok(FileBytes::Mmap(mmap))
    } else {
        std::fs::read(path).map(FileBytes::Vec).map_err(read_error)
    }
}

/// Owned or memory-mapped file contents
pub enum FileBytes {
    Vec(Vec<u8>),
    Mmap(Mmap),
}

impl AsRef<[u8]> for FileBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            FileBytes::Vec(v) => v,
            FileBytes::Mmap(m) => m,
        }
    }
}

impl std::ops::Deref for FileBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_ref()
    }
}
