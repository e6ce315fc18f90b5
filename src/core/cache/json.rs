//! JSON file backend, the default scan cache store.

use super::{CachedComparison, ScanCacheBackend};
use crate::core::storage::{read_json, write_json_atomic};
use crate::error::CacheError;
use std::path::{Path, PathBuf};

/// Scan cache stored as a pretty-printed JSON list
#[derive(Debug, Clone)]
pub struct JsonCacheBackend {
    path: PathBuf,
}

impl JsonCacheBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScanCacheBackend for JsonCacheBackend {
    fn load(&self) -> Result<Vec<CachedComparison>, CacheError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    fn save(&self, entries: &[CachedComparison]) -> Result<(), CacheError> {
        write_json_atomic(&self.path, entries)?;
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
