//! Integration tests for the pipeline module.
//!
//! These tests run the full scan → register → thumbnail → compare → report
//! workflow against real files in a temporary directory, including:
//! - Identical files short-circuiting the comparator
//! - Result stability across worker counts
//! - Scan cache reuse between runs (JSON and SQLite)
//! - Removed files leaving the registry and the pair list
//! - Corrupted metadata stores being fatal with a recovery hint

use image::{DynamicImage, ImageBuffer, Rgb};
use similar_image_finder::core::comparator::{
    ImageComparator, MatchType, MismatchThreshold, PixelComparator,
};
use similar_image_finder::core::config::{CacheBackendKind, DedupConfig, MetadataPaths};
use similar_image_finder::core::pipeline::{Pipeline, PipelineResult};
use similar_image_finder::error::DuplicateFinderError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Pixel comparator that counts how often it is asked
struct CountingComparator {
    inner: PixelComparator,
    calls: AtomicUsize,
}

impl CountingComparator {
    fn new() -> Self {
        Self {
            inner: PixelComparator::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageComparator for CountingComparator {
    fn compare(&self, first: &DynamicImage, second: &DynamicImage) -> f64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compare(first, second)
    }
}

/// Write a 64x48 PNG whose content depends on `seed`
fn write_image(dir: &Path, name: &str, seed: u8) -> PathBuf {
    let img = ImageBuffer::from_fn(64, 48, |x, y| {
        let band = ((x / 16 + y / 12) as u8).wrapping_mul(seed);
        Rgb([band, seed.wrapping_mul(7), (x as u8).wrapping_add(seed)])
    });
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn config(dir: &Path, workers: usize) -> DedupConfig {
    DedupConfig::builder(dir)
        .worker_count(workers)
        .threshold(MismatchThreshold::lenient())
        .build()
        .unwrap()
}

fn run(config: DedupConfig) -> PipelineResult {
    Pipeline::builder(config).build().run().unwrap()
}

/// Candidate pairs as (file name, file name, score), order-independent
fn candidate_names(result: &PipelineResult) -> BTreeSet<(String, String, String)> {
    let name = |p: &Path| p.file_name().unwrap().to_string_lossy().into_owned();
    result
        .report
        .candidates()
        .iter()
        .map(|c| {
            let (a, b) = (name(&c.first), name(&c.second));
            let (a, b) = if a <= b { (a, b) } else { (b, a) };
            (a, b, format!("{:.2}", c.mismatch_percentage))
        })
        .collect()
}

#[test]
fn identical_files_are_matched_by_digest() {
    let temp_dir = TempDir::new().unwrap();
    let a = write_image(temp_dir.path(), "a.png", 3);
    std::fs::copy(&a, temp_dir.path().join("b.png")).unwrap();
    write_image(temp_dir.path(), "c.png", 200);

    let comparator = Arc::new(CountingComparator::new());
    let result = Pipeline::builder(config(temp_dir.path(), 2))
        .comparator(comparator.clone())
        .build()
        .run()
        .unwrap();

    assert_eq!(result.total_images, 3);
    assert_eq!(result.total_pairs, 3);
    assert_eq!(result.digest_matches, 1);
    assert_eq!(result.computed, 2);
    assert_eq!(comparator.calls(), 2);

    let candidates = result.report.candidates();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].mismatch_percentage, 0.0);
    assert_eq!(candidates[0].match_type, MatchType::Exact);
    assert!(candidates[0].first.ends_with("a.png"));
    assert!(candidates[0].second.ends_with("b.png"));
}

#[test]
fn report_is_saved_when_duplicates_exist() {
    let temp_dir = TempDir::new().unwrap();
    let a = write_image(temp_dir.path(), "a.png", 9);
    std::fs::copy(&a, temp_dir.path().join("copy.png")).unwrap();

    let result = run(config(temp_dir.path(), 1));

    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    assert_eq!(result.report_path.as_deref(), Some(metadata.report().as_path()));
    let saved = std::fs::read_to_string(metadata.report()).unwrap();
    assert!(saved.contains("Exact Match"));
    assert!(saved.contains("copy.png"));
}

#[test]
fn no_duplicates_writes_no_report() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "a.png", 1);
    write_image(temp_dir.path(), "b.png", 130);

    let result = DedupConfig::builder(temp_dir.path())
        .threshold(MismatchThreshold::new(0.0).unwrap())
        .build()
        .map(|config| Pipeline::builder(config).build().run().unwrap())
        .unwrap();

    assert!(!result.report.has_duplicates());
    assert!(result.report_path.is_none());
    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    assert!(!metadata.report().exists());
}

#[test]
fn report_from_earlier_run_is_removed_once_duplicates_are_gone() {
    let temp_dir = TempDir::new().unwrap();
    let a = write_image(temp_dir.path(), "a.png", 12);
    let copy = temp_dir.path().join("copy.png");
    std::fs::copy(&a, &copy).unwrap();
    write_image(temp_dir.path(), "b.png", 150);

    let first = run(config(temp_dir.path(), 2));
    let report = first.report_path.unwrap();
    assert!(report.is_file());

    std::fs::remove_file(&copy).unwrap();
    let second = run(config(temp_dir.path(), 2));

    assert!(!second.report.has_duplicates());
    assert!(!report.exists());
}

#[test]
fn worker_count_does_not_change_the_result() {
    let single = TempDir::new().unwrap();
    let many = TempDir::new().unwrap();
    for dir in [single.path(), many.path()] {
        for i in 0..10u8 {
            write_image(dir, &format!("img{:02}.png", i), (i % 4) * 60 + 1);
        }
    }

    let one = run(config(single.path(), 1));
    let four = run(config(many.path(), 4));

    assert_eq!(one.total_pairs, 45);
    assert_eq!(four.total_pairs, 45);
    assert!(one.report.has_duplicates());
    assert_eq!(candidate_names(&one), candidate_names(&four));
}

#[test]
fn second_run_reuses_every_cached_score() {
    let temp_dir = TempDir::new().unwrap();
    for (i, seed) in [5u8, 90, 170, 250].iter().enumerate() {
        write_image(temp_dir.path(), &format!("{}.png", i), *seed);
    }

    let first = run(config(temp_dir.path(), 2));
    assert_eq!(first.cache_hits, 0);
    assert_eq!(first.total_pairs, 6);

    let comparator = Arc::new(CountingComparator::new());
    let second = Pipeline::builder(config(temp_dir.path(), 2))
        .comparator(comparator.clone())
        .build()
        .run()
        .unwrap();

    assert_eq!(second.cache_hits, 6);
    assert_eq!(second.computed, 0);
    assert_eq!(second.added_images, 0);
    assert_eq!(second.thumbnails_generated, 0);
    assert_eq!(comparator.calls(), 0);
    assert_eq!(candidate_names(&first), candidate_names(&second));
}

#[test]
fn sqlite_cache_backend_persists_scores() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "a.png", 10);
    write_image(temp_dir.path(), "b.png", 80);
    write_image(temp_dir.path(), "c.png", 160);
    let sqlite = |dir: &Path| {
        DedupConfig::builder(dir)
            .cache_backend(CacheBackendKind::Sqlite)
            .build()
            .unwrap()
    };

    let first = run(sqlite(temp_dir.path()));
    let second = run(sqlite(temp_dir.path()));

    assert_eq!(first.computed, 3);
    assert_eq!(second.cache_hits, 3);
    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    assert!(metadata.scan_cache(CacheBackendKind::Sqlite).is_file());
}

#[test]
fn deleted_file_leaves_registry_and_pairs() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "keep1.png", 20);
    write_image(temp_dir.path(), "keep2.png", 120);
    let gone = write_image(temp_dir.path(), "gone.png", 220);

    let first = run(config(temp_dir.path(), 2));
    assert_eq!(first.total_pairs, 3);

    std::fs::remove_file(&gone).unwrap();
    let second = run(config(temp_dir.path(), 2));

    assert_eq!(second.total_images, 2);
    assert_eq!(second.removed_images, 1);
    assert_eq!(second.total_pairs, 1);
    assert_eq!(second.cache_hits, 1);

    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    let registry = std::fs::read_to_string(metadata.registry()).unwrap();
    assert!(!registry.contains("gone.png"));
    assert!(registry.contains("keep1.png"));

    let previews = std::fs::read_dir(metadata.thumbnails_dir()).unwrap().count();
    assert_eq!(previews, 2);
}

#[test]
fn unreadable_image_is_skipped_not_fatal() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "a.png", 40);
    write_image(temp_dir.path(), "b.png", 140);
    std::fs::write(temp_dir.path().join("broken.jpg"), b"definitely not a jpeg").unwrap();

    let result = run(config(temp_dir.path(), 2));

    assert_eq!(result.total_images, 3);
    assert_eq!(result.total_pairs, 3);
    assert!(!result.errors.is_empty());
    assert!(result.errors.iter().any(|e| e.contains("broken.jpg")));
}

#[test]
fn hidden_and_metadata_files_are_not_scanned() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "visible.png", 60);
    write_image(temp_dir.path(), ".hidden.png", 60);

    let first = run(config(temp_dir.path(), 1));
    // Previews now live under .imgdup/thumbnails; they must not be picked up.
    let second = run(config(temp_dir.path(), 1));

    assert_eq!(first.total_images, 1);
    assert_eq!(second.total_images, 1);
    assert_eq!(second.added_images, 0);
}

#[test]
fn corrupted_registry_is_fatal_with_recovery_hint() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "a.png", 1);
    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    std::fs::create_dir_all(metadata.dir()).unwrap();
    std::fs::write(metadata.registry(), b"{ not json").unwrap();

    let err = Pipeline::builder(config(temp_dir.path(), 1))
        .build()
        .run()
        .unwrap_err();

    assert!(matches!(err, DuplicateFinderError::Registry(_)));
    assert!(!err.is_invalid_input());
    assert!(err.to_string().contains("Delete this file"));
}

#[test]
fn corrupted_scan_cache_is_fatal_with_recovery_hint() {
    let temp_dir = TempDir::new().unwrap();
    write_image(temp_dir.path(), "a.png", 1);
    write_image(temp_dir.path(), "b.png", 99);
    let metadata = MetadataPaths::for_root(&temp_dir.path().canonicalize().unwrap());
    std::fs::create_dir_all(metadata.dir()).unwrap();
    std::fs::write(metadata.scan_cache(CacheBackendKind::Json), b"[{\"pair_key\":").unwrap();

    let err = Pipeline::builder(config(temp_dir.path(), 1))
        .build()
        .run()
        .unwrap_err();

    assert!(matches!(err, DuplicateFinderError::Cache(_)));
    assert!(err.to_string().contains("Delete this file"));
}

#[test]
fn missing_root_is_invalid_input() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope");

    let err = DedupConfig::builder(&missing).build().unwrap_err();

    assert!(err.is_invalid_input());
    assert!(!missing.join(".imgdup").exists());
}
