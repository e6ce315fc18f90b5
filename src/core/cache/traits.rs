//! Cache backend trait definition.

use super::CachedComparison;
use crate::error::CacheError;
use std::path::Path;

/// Durable storage for the scan cache
///
/// Backends are whole-store: the cache is read once per run and rewritten
/// in one pass. They are never touched by worker threads.
pub trait ScanCacheBackend: Send + Sync {
    /// Read every stored comparison. An absent store is empty.
    fn load(&self) -> Result<Vec<CachedComparison>, CacheError>;

    /// Replace the stored comparisons with `entries`
    fn save(&self, entries: &[CachedComparison]) -> Result<(), CacheError>;

    /// Where the store lives, for log and error messages
    fn location(&self) -> &Path;
}
