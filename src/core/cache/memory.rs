//! In-memory cache backend for testing.

use super::{CachedComparison, ScanCacheBackend};
use crate::error::CacheError;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-memory scan cache backend
///
/// Useful for testing and for runs where nothing should be persisted.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<Vec<CachedComparison>>,
    saves: AtomicUsize,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `entries` already stored
    pub fn with_entries(entries: Vec<CachedComparison>) -> Self {
        Self {
            entries: RwLock::new(entries),
            saves: AtomicUsize::new(0),
        }
    }

    /// Copy of what is currently stored
    pub fn snapshot(&self) -> Vec<CachedComparison> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// How many times the store has been rewritten
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl ScanCacheBackend for InMemoryCacheBackend {
    fn load(&self) -> Result<Vec<CachedComparison>, CacheError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| CacheError::QueryFailed("in-memory cache lock poisoned".to_string()))?;
        Ok(entries.clone())
    }

    fn save(&self, new_entries: &[CachedComparison]) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| CacheError::QueryFailed("in-memory cache lock poisoned".to_string()))?;
        *entries = new_entries.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn location(&self) -> &Path {
        Path::new(":memory:")
    }
}
