//! # Pairs Module
//!
//! Builds the comparison work list and scores individual pairs.
//!
//! Every unordered pair of registered records becomes exactly one
//! [`PairTask`]. Pairs the scan cache already knows are marked
//! [`PairResolution::Cached`] but stay in the list, so the orchestrator
//! ticks progress for them like for any other pair; [`PairScorer`] then
//! answers them without touching the comparator.

use crate::core::cache::{CachedComparison, PairKey, ScanCache};
use crate::core::comparator::ImageComparator;
use crate::core::config::MetadataPaths;
use crate::core::decode::decode_image;
use crate::core::registry::ImageRecord;
use crate::error::FileAccessError;
use image::DynamicImage;
use std::path::PathBuf;
use std::sync::Arc;

/// Whether a pair still needs a comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairResolution {
    /// Score found in the scan cache
    Cached(f64),
    /// Needs the digest shortcut or the comparator
    Pending,
}

/// One unordered pair of records to score
#[derive(Debug, Clone)]
pub struct PairTask {
    pub key: PairKey,
    pub first: Arc<ImageRecord>,
    pub second: Arc<ImageRecord>,
    pub resolution: PairResolution,
}

impl PairTask {
    pub fn is_cached(&self) -> bool {
        matches!(self.resolution, PairResolution::Cached(_))
    }
}

/// Number of unordered pairs among `n` records
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Every unordered pair of distinct records, each exactly once.
///
/// Records keep their input order; pair `(i, j)` with `i < j` is emitted
/// in row-major order.
pub fn generate_pairs(records: &[ImageRecord], cache: &ScanCache) -> Vec<PairTask> {
    let records: Vec<Arc<ImageRecord>> = records.iter().cloned().map(Arc::new).collect();
    let mut pairs = Vec::with_capacity(pair_count(records.len()));

    for i in 0..records.len() {
        for j in (i + 1)..records.len() {
            let key = PairKey::new(records[i].id, records[j].id);
            let resolution = match cache.get(&key) {
                Some(score) => PairResolution::Cached(score),
                None => PairResolution::Pending,
            };
            pairs.push(PairTask {
                key,
                first: Arc::clone(&records[i]),
                second: Arc::clone(&records[j]),
                resolution,
            });
        }
    }

    pairs
}

/// Where a pair's score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    /// Read back from the scan cache
    Cached,
    /// Byte-identical files, scored 0 without decoding
    DigestMatch,
    /// Computed by the comparator this run
    Computed,
}

/// A pair with its mismatch percentage
#[derive(Debug, Clone)]
pub struct ScoredPair {
    pub key: PairKey,
    pub first: Arc<ImageRecord>,
    pub second: Arc<ImageRecord>,
    pub mismatch_percentage: f64,
    pub source: ScoreSource,
}

impl ScoredPair {
    /// Scores produced this run, which the cache does not hold yet
    pub fn is_new(&self) -> bool {
        self.source != ScoreSource::Cached
    }

    pub fn to_cached(&self) -> CachedComparison {
        CachedComparison::new(self.key, self.mismatch_percentage)
    }
}

/// Which pixels a comparison looks at
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Always decode the original files
    Originals,
    /// Use a record's preview when one exists, the original otherwise
    Previews(MetadataPaths),
}

impl ImageSource {
    fn path_for(&self, record: &ImageRecord) -> PathBuf {
        match self {
            ImageSource::Originals => record.path.clone(),
            ImageSource::Previews(metadata) => {
                let preview = metadata.thumbnail(&record.id);
                if preview.is_file() {
                    preview
                } else {
                    record.path.clone()
                }
            }
        }
    }

    fn load(&self, record: &ImageRecord) -> Result<DynamicImage, FileAccessError> {
        decode_image(&self.path_for(record))
    }
}

/// Scores a single pair: cache first, then digests, then the comparator
#[derive(Clone)]
pub struct PairScorer {
    comparator: Arc<dyn ImageComparator>,
    source: ImageSource,
}

impl PairScorer {
    pub fn new(comparator: Arc<dyn ImageComparator>, source: ImageSource) -> Self {
        Self { comparator, source }
    }

    pub fn score(&self, task: &PairTask) -> Result<ScoredPair, FileAccessError> {
        let (mismatch_percentage, source) = match task.resolution {
            PairResolution::Cached(score) => (score, ScoreSource::Cached),
            PairResolution::Pending if task.first.same_content(&task.second) => {
                (0.0, ScoreSource::DigestMatch)
            }
            PairResolution::Pending => {
                let first = self.source.load(&task.first)?;
                let second = self.source.load(&task.second)?;
                let score = self.comparator.compare(&first, &second);
                if score.is_nan() {
                    return Err(FileAccessError::Compare {
                        path: task.first.path.clone(),
                        reason: format!(
                            "{} returned no score against {}",
                            self.comparator.name(),
                            task.second.path.display()
                        ),
                    });
                }
                (score.clamp(0.0, 100.0), ScoreSource::Computed)
            }
        };

        Ok(ScoredPair {
            key: task.key,
            first: Arc::clone(&task.first),
            second: Arc::clone(&task.second),
            mismatch_percentage,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::InMemoryCacheBackend;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingComparator {
        calls: AtomicUsize,
    }

    impl ImageComparator for CountingComparator {
        fn compare(&self, _: &DynamicImage, _: &DynamicImage) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            33.0
        }
    }

    fn records(n: usize) -> Vec<ImageRecord> {
        (0..n)
            .map(|i| ImageRecord::new(PathBuf::from(format!("/img/{}.png", i)), format!("d{}", i)))
            .collect()
    }

    fn empty_cache() -> ScanCache {
        ScanCache::load(Arc::new(InMemoryCacheBackend::new())).unwrap()
    }

    #[test]
    fn yields_every_unordered_pair_exactly_once() {
        for n in 0..12 {
            let records = records(n);
            let pairs = generate_pairs(&records, &empty_cache());

            assert_eq!(pairs.len(), n * n.saturating_sub(1) / 2);
            let keys: HashSet<PairKey> = pairs.iter().map(|p| p.key).collect();
            assert_eq!(keys.len(), pairs.len());
            assert!(pairs.iter().all(|p| p.first.id != p.second.id));
        }
    }

    #[test]
    fn cached_pairs_are_resolved_but_kept() {
        let records = records(3);
        let known = PairKey::new(records[2].id, records[0].id);
        let backend =
            InMemoryCacheBackend::with_entries(vec![CachedComparison::new(known, 12.5)]);
        let cache = ScanCache::load(Arc::new(backend)).unwrap();

        let pairs = generate_pairs(&records, &cache);

        assert_eq!(pairs.len(), 3);
        let cached: Vec<&PairTask> = pairs.iter().filter(|p| p.is_cached()).collect();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].key, known);
        assert_eq!(cached[0].resolution, PairResolution::Cached(12.5));
    }

    #[test]
    fn cached_pair_never_reaches_the_comparator() {
        let comparator = Arc::new(CountingComparator {
            calls: AtomicUsize::new(0),
        });
        let scorer = PairScorer::new(comparator.clone(), ImageSource::Originals);
        let records = records(2);
        let task = PairTask {
            key: PairKey::new(records[0].id, records[1].id),
            first: Arc::new(records[0].clone()),
            second: Arc::new(records[1].clone()),
            resolution: PairResolution::Cached(41.0),
        };

        let scored = scorer.score(&task).unwrap();

        assert_eq!(scored.mismatch_percentage, 41.0);
        assert_eq!(scored.source, ScoreSource::Cached);
        assert!(!scored.is_new());
        assert_eq!(comparator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn identical_digests_score_zero_without_decoding() {
        let comparator = Arc::new(CountingComparator {
            calls: AtomicUsize::new(0),
        });
        let scorer = PairScorer::new(comparator.clone(), ImageSource::Originals);
        // Paths do not exist, so any decode attempt would fail.
        let a = ImageRecord::new(PathBuf::from("/missing/a.jpg"), "same".into());
        let b = ImageRecord::new(PathBuf::from("/missing/b.jpg"), "same".into());
        let task = PairTask {
            key: PairKey::new(a.id, b.id),
            first: Arc::new(a),
            second: Arc::new(b),
            resolution: PairResolution::Pending,
        };

        let scored = scorer.score(&task).unwrap();

        assert_eq!(scored.mismatch_percentage, 0.0);
        assert_eq!(scored.source, ScoreSource::DigestMatch);
        assert!(scored.is_new());
        assert_eq!(comparator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unreadable_image_is_a_file_access_error() {
        let scorer = PairScorer::new(
            Arc::new(CountingComparator {
                calls: AtomicUsize::new(0),
            }),
            ImageSource::Originals,
        );
        let a = ImageRecord::new(PathBuf::from("/missing/a.jpg"), "1".into());
        let b = ImageRecord::new(PathBuf::from("/missing/b.jpg"), "2".into());
        let task = PairTask {
            key: PairKey::new(a.id, b.id),
            first: Arc::new(a),
            second: Arc::new(b),
            resolution: PairResolution::Pending,
        };

        let err = scorer.score(&task).unwrap_err();
        assert_eq!(err.path(), &PathBuf::from("/missing/a.jpg"));
    }

    #[test]
    fn nan_score_is_a_pair_failure() {
        struct NanComparator;

        impl ImageComparator for NanComparator {
            fn compare(&self, _: &DynamicImage, _: &DynamicImage) -> f64 {
                f64::NAN
            }
        }

        let temp_dir = tempfile::TempDir::new().unwrap();
        let write = |name: &str| {
            let path = temp_dir.path().join(name);
            image::RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]))
                .save(&path)
                .unwrap();
            path
        };
        let a = ImageRecord::new(write("a.png"), "1".into());
        let b = ImageRecord::new(write("b.png"), "2".into());
        let task = PairTask {
            key: PairKey::new(a.id, b.id),
            first: Arc::new(a),
            second: Arc::new(b),
            resolution: PairResolution::Pending,
        };

        let scorer = PairScorer::new(Arc::new(NanComparator), ImageSource::Originals);
        let err = scorer.score(&task).unwrap_err();

        assert!(matches!(err, FileAccessError::Compare { .. }));
        assert!(err.path().ends_with("a.png"));
    }
}
