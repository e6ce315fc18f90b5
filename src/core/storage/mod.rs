//! # Storage Module
//!
//! Whole-file persistence for the metadata stores.
//!
//! Stores are read once and rewritten in one pass. Writes go to a temporary
//! file in the same directory which is then renamed over the target, so a
//! crash leaves either the old or the new contents on disk, never a mix.

use crate::error::{CacheError, RegistryError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Failure reading or writing a store file
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} could not be parsed: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Io { path, source } => RegistryError::Io { path, source },
            StoreError::Corrupted { path, reason } => RegistryError::Corrupted { path, reason },
            StoreError::Serialize(reason) => RegistryError::SerializationFailed(reason),
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Io { path, source } => CacheError::Io { path, source },
            StoreError::Corrupted { path, reason } => CacheError::Corrupted { path, reason },
            StoreError::Serialize(reason) => CacheError::SerializationFailed(reason),
        }
    }
}

/// Read a JSON store. A missing file is `Ok(None)`; anything unparsable,
/// including an empty file, is reported as corruption.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreError::Corrupted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut json =
        serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    json.push(b'\n');

    write_bytes_atomic(path, &json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically replace `path` with `bytes`, creating parent directories.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
