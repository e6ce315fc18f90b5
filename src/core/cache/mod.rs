//! # Cache Module
//!
//! Persists pair mismatch scores so a pair is only ever compared once.
//!
//! ## Lifecycle
//! - [`ScanCache::load`] reads the whole store once, before any workers run
//! - the pair generator reads it while building tasks
//! - after the comparison phase, [`ScanCache::merge`] adds the new scores
//!   (first write wins) and rewrites the store in one pass
//!
//! ## Backends
//! - `JsonCacheBackend` - pretty-printed JSON list (default)
//! - `SqliteCacheBackend` - SQLite table
//! - `InMemoryCacheBackend` - for testing

mod json;
mod memory;
mod sqlite;
mod traits;

pub use json::JsonCacheBackend;
pub use memory::InMemoryCacheBackend;
pub use sqlite::SqliteCacheBackend;
pub use traits::ScanCacheBackend;

use crate::core::config::CacheBackendKind;
use crate::core::registry::RecordId;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Unordered pair of two record ids.
///
/// Always stored as `(smaller, larger)`, so `PairKey::new(a, b)` and
/// `PairKey::new(b, a)` are the same key. A stored key naming the same
/// record twice fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "(RecordId, RecordId)")]
pub struct PairKey(RecordId, RecordId);

impl PairKey {
    pub fn new(a: RecordId, b: RecordId) -> Self {
        debug_assert_ne!(a, b, "a pair needs two distinct records");
        Self::ordered(a, b)
    }

    /// Key for two ids read from a store; `None` when both are the same
    pub fn try_new(a: RecordId, b: RecordId) -> Option<Self> {
        (a != b).then(|| Self::ordered(a, b))
    }

    fn ordered(a: RecordId, b: RecordId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Both ids, smaller first
    pub fn ids(&self) -> (RecordId, RecordId) {
        (self.0, self.1)
    }

    /// Whether `id` is one side of this pair
    pub fn contains(&self, id: &RecordId) -> bool {
        self.0 == *id || self.1 == *id
    }
}

impl TryFrom<(RecordId, RecordId)> for PairKey {
    type Error = String;

    fn try_from((a, b): (RecordId, RecordId)) -> Result<Self, Self::Error> {
        PairKey::try_new(a, b).ok_or_else(|| format!("pair key names record {} twice", a))
    }
}

/// A mismatch score computed in some earlier (or the current) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedComparison {
    pub pair_key: PairKey,
    /// Percentage of differing pixels, in `[0, 100]`
    pub mismatch_percentage: f64,
}

impl CachedComparison {
    pub fn new(pair_key: PairKey, mismatch_percentage: f64) -> Self {
        Self {
            pair_key,
            mismatch_percentage,
        }
    }
}

/// Open the backend selected in the configuration
pub fn open_backend(
    kind: CacheBackendKind,
    path: &Path,
) -> Result<Arc<dyn ScanCacheBackend>, CacheError> {
    Ok(match kind {
        CacheBackendKind::Json => Arc::new(JsonCacheBackend::new(path)),
        CacheBackendKind::Sqlite => Arc::new(SqliteCacheBackend::open(path)?),
    })
}

/// The scan cache for one run: the stored scores, held in memory
pub struct ScanCache {
    backend: Arc<dyn ScanCacheBackend>,
    entries: BTreeMap<PairKey, f64>,
}

impl ScanCache {
    /// Read every stored score from `backend`.
    ///
    /// Scores that are not a percentage, or keys pairing a record with
    /// itself, mean the store was tampered with or damaged and are reported
    /// as corruption.
    pub fn load(backend: Arc<dyn ScanCacheBackend>) -> Result<Self, CacheError> {
        let corrupted = |reason: String| CacheError::Corrupted {
            path: backend.location().to_path_buf(),
            reason,
        };

        let mut entries = BTreeMap::new();
        for entry in backend.load()? {
            let score = entry.mismatch_percentage;
            if !is_percentage(score) {
                return Err(corrupted(format!(
                    "mismatch percentage {} is out of range",
                    score
                )));
            }
            let (first, second) = entry.pair_key.ids();
            if first == second {
                return Err(corrupted(format!("pair key names record {} twice", first)));
            }
            entries.entry(entry.pair_key).or_insert(score);
        }

        debug!(
            entries = entries.len(),
            location = %backend.location().display(),
            "loaded scan cache"
        );

        Ok(Self { backend, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached score for `key`, in either orientation
    pub fn get(&self, key: &PairKey) -> Option<f64> {
        self.entries.get(key).copied()
    }

    /// Drop entries that mention a record no longer in `live_ids`.
    ///
    /// Only the in-memory view changes; the next [`merge`](Self::merge)
    /// or [`save`](Self::save) persists it.
    pub fn prune_orphans(&mut self, live_ids: &HashSet<RecordId>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let (a, b) = key.ids();
            live_ids.contains(&a) && live_ids.contains(&b)
        });
        before - self.entries.len()
    }

    /// Add new scores and rewrite the store.
    ///
    /// A key that is already present keeps its stored score, so merging the
    /// same result twice changes nothing. Returns how many entries were
    /// actually added.
    ///
    /// Scores outside `[0, 100]` (including NaN) are dropped with a warning
    /// so that a misbehaving comparator cannot poison the store.
    pub fn merge(&mut self, results: Vec<CachedComparison>) -> Result<usize, CacheError> {
        let mut added = 0;
        for result in results {
            if !is_percentage(result.mismatch_percentage) {
                warn!(
                    pair = ?result.pair_key,
                    score = result.mismatch_percentage,
                    "not caching invalid mismatch percentage"
                );
                continue;
            }
            if !self.entries.contains_key(&result.pair_key) {
                self.entries
                    .insert(result.pair_key, result.mismatch_percentage);
                added += 1;
            }
        }

        self.save()?;
        debug!(added, total = self.entries.len(), "merged scan cache");
        Ok(added)
    }

    /// Write every held entry to the backend in one pass
    pub fn save(&self) -> Result<(), CacheError> {
        let entries: Vec<CachedComparison> = self
            .entries
            .iter()
            .map(|(key, score)| CachedComparison::new(*key, *score))
            .collect();
        self.backend.save(&entries)
    }
}

fn is_percentage(score: f64) -> bool {
    score.is_finite() && (0.0..=100.0).contains(&score)
}
