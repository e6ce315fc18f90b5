//! Pipeline execution implementation.

use crate::core::cache::{open_backend, ScanCache, ScanCacheBackend};
use crate::core::comparator::{ImageComparator, PixelComparator};
use crate::core::config::DedupConfig;
use crate::core::hasher::{ContentHasher, Xxh3Hasher};
use crate::core::orchestrator::{CancellationToken, WorkOrchestrator};
use crate::core::cache::CachedComparison;
use crate::core::pairs::{
    generate_pairs, ImageSource, PairScorer, PairTask, ScoreSource, ScoredPair,
};
use crate::core::registry::FileRegistry;
use crate::core::reporter::DuplicateReport;
use crate::core::scanner::{ImageScanner, ScanConfig, WalkDirScanner};
use crate::core::thumbnail::{JpegThumbnailGenerator, ThumbnailGenerator, ThumbnailPipeline};
use crate::error::{DuplicateFinderError, FileAccessError, WorkerError};
use crate::events::{null_sender, Event, EventSender, PipelineEvent, PipelinePhase, PipelineSummary};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Result of pipeline execution
#[derive(Debug)]
pub struct PipelineResult {
    /// The duplicate report (already saved when it has candidates)
    pub report: DuplicateReport,
    /// Where the report was written, if anywhere
    pub report_path: Option<PathBuf>,
    /// Images registered after reconciliation
    pub total_images: usize,
    /// Records added and removed by this run's reconciliation
    pub added_images: usize,
    pub removed_images: usize,
    /// Previews generated this run
    pub thumbnails_generated: usize,
    /// Unordered pairs considered
    pub total_pairs: usize,
    /// Pairs answered by the scan cache
    pub cache_hits: usize,
    /// Pairs scored 0 because their digests match
    pub digest_matches: usize,
    /// Pairs scored by the comparator
    pub computed: usize,
    /// Worker restarts after stalls or crashes
    pub worker_retries: u32,
    /// Non-fatal problems (unreadable files, skipped pairs)
    pub errors: Vec<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Builder for a [`Pipeline`]
///
/// Every collaborator has a default; tests swap in fakes.
pub struct PipelineBuilder {
    config: DedupConfig,
    scanner: Option<Box<dyn ImageScanner>>,
    hasher: Option<Arc<dyn ContentHasher>>,
    generator: Option<Arc<dyn ThumbnailGenerator>>,
    comparator: Option<Arc<dyn ImageComparator>>,
    cache_backend: Option<Arc<dyn ScanCacheBackend>>,
    cancel: CancellationToken,
}

impl PipelineBuilder {
    pub fn new(config: DedupConfig) -> Self {
        Self {
            config,
            scanner: None,
            hasher: None,
            generator: None,
            comparator: None,
            cache_backend: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scanner(mut self, scanner: Box<dyn ImageScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn thumbnail_generator(mut self, generator: Arc<dyn ThumbnailGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn comparator(mut self, comparator: Arc<dyn ImageComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Use this scan cache store instead of the one the config selects
    pub fn cache_backend(mut self, backend: Arc<dyn ScanCacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Pipeline {
        let scanner = self.scanner.unwrap_or_else(|| {
            Box::new(WalkDirScanner::new(ScanConfig {
                include_hidden: self.config.include_hidden,
                ..Default::default()
            }))
        });

        Pipeline {
            scanner,
            hasher: self.hasher.unwrap_or_else(|| Arc::new(Xxh3Hasher)),
            generator: self
                .generator
                .unwrap_or_else(|| Arc::new(JpegThumbnailGenerator::new())),
            comparator: self
                .comparator
                .unwrap_or_else(|| Arc::new(PixelComparator::new())),
            cache_backend: self.cache_backend,
            cancel: self.cancel,
            config: self.config,
        }
    }
}

/// The duplicate detection pipeline
pub struct Pipeline {
    config: DedupConfig,
    scanner: Box<dyn ImageScanner>,
    hasher: Arc<dyn ContentHasher>,
    generator: Arc<dyn ThumbnailGenerator>,
    comparator: Arc<dyn ImageComparator>,
    cache_backend: Option<Arc<dyn ScanCacheBackend>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline builder
    pub fn builder(config: DedupConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Token that stops the run's workers when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the pipeline without events
    pub fn run(&self) -> Result<PipelineResult, DuplicateFinderError> {
        self.run_with_events(&null_sender())
    }

    /// Run the pipeline with event reporting
    pub fn run_with_events(
        &self,
        events: &EventSender,
    ) -> Result<PipelineResult, DuplicateFinderError> {
        events.send(Event::Pipeline(PipelineEvent::Started));

        let result = self.execute(events);
        match &result {
            Ok(result) => events.send(Event::Pipeline(PipelineEvent::Completed {
                summary: PipelineSummary {
                    total_images: result.total_images,
                    total_pairs: result.total_pairs,
                    cache_hits: result.cache_hits,
                    duplicate_pairs: result.report.candidates().len(),
                    duration_ms: result.duration_ms,
                },
            })),
            Err(error) if error.is_cancelled() => {
                events.send(Event::Pipeline(PipelineEvent::Cancelled))
            }
            Err(error) => events.send(Event::Pipeline(PipelineEvent::Error {
                message: error.to_string(),
            })),
        }
        result
    }

    fn execute(&self, events: &EventSender) -> Result<PipelineResult, DuplicateFinderError> {
        let start_time = Instant::now();
        let config = &self.config;
        let metadata = &config.metadata;
        let orchestrator = WorkOrchestrator::from_config(config, self.cancel.clone());
        let mut errors = Vec::new();

        std::fs::create_dir_all(metadata.dir()).map_err(|source| FileAccessError::Write {
            path: metadata.dir().to_path_buf(),
            source,
        })?;

        // Phase 1: Scanning
        phase(events, PipelinePhase::Scanning);
        let scan = self.scanner.scan(&config.root, events)?;
        errors.extend(scan.errors.iter().map(|e| e.to_string()));
        info!(root = %config.root.display(), images = scan.paths.len(), "scan complete");

        // Phase 2: Registering
        phase(events, PipelinePhase::Registering);
        let mut registry = FileRegistry::open(&metadata.registry())?;
        let sync = registry.sync(&scan.paths, self.hasher.as_ref(), events);
        registry.save()?;
        errors.extend(sync.skipped.iter().map(|e| e.to_string()));

        let thumbnails = ThumbnailPipeline::new(
            Arc::clone(&self.generator),
            metadata.clone(),
            config.bounding_box,
        );
        thumbnails.remove_previews(&sync.removed);

        let records = registry.records();
        info!(
            total = records.len(),
            added = sync.added.len(),
            removed = sync.removed.len(),
            skipped = sync.skipped.len(),
            "registry synced"
        );

        // Phase 3: Thumbnails
        let mut thumbnails_generated = 0;
        let mut worker_retries = 0u32;
        if config.generate_thumbnails {
            phase(events, PipelinePhase::Thumbnailing);
            let report = thumbnails.run(&records, &orchestrator, events)?;
            thumbnails_generated = report.generated;
            worker_retries += report.retries;
            errors.extend(report.failed.iter().map(|e| e.to_string()));
        }

        // Phase 4: Comparing
        phase(events, PipelinePhase::Comparing);
        let backend = match &self.cache_backend {
            Some(backend) => Arc::clone(backend),
            None => open_backend(config.cache_backend, &config.scan_cache_path())?,
        };
        let mut cache = ScanCache::load(backend)?;
        let pruned = cache.prune_orphans(&registry.ids());
        if pruned > 0 {
            info!(pruned, "dropped cached scores for removed files");
        }

        let pairs: Vec<PairTask> = generate_pairs(&records, &cache);
        let total_pairs = pairs.len();
        let cached_pairs = pairs.iter().filter(|p| p.is_cached()).count();
        info!(pairs = total_pairs, cached = cached_pairs, "comparing pairs");

        let source = if config.compare_thumbnails {
            ImageSource::Previews(metadata.clone())
        } else {
            ImageSource::Originals
        };
        let scorer = PairScorer::new(Arc::clone(&self.comparator), source);
        // New scores as they finish, kept in case the episode fails
        let finished: Arc<Mutex<Vec<CachedComparison>>> = Arc::default();
        let sink = Arc::clone(&finished);
        let episode = orchestrator.run(
            PipelinePhase::Comparing,
            pairs,
            move |task: &PairTask| {
                let scored = scorer.score(task)?;
                if scored.is_new() {
                    if let Ok(mut sink) = sink.lock() {
                        sink.push(scored.to_cached());
                    }
                }
                Ok::<ScoredPair, FileAccessError>(scored)
            },
            events,
        );
        let episode = match episode {
            Ok(episode) => episode,
            Err(error) => return Err(keep_finished_scores(&mut cache, &finished, error)),
        };
        worker_retries += episode.retries;
        errors.extend(episode.failures.iter().map(|e| e.to_string()));

        let scored = episode.results;
        let count = |source: ScoreSource| scored.iter().filter(|p| p.source == source).count();
        let cache_hits = count(ScoreSource::Cached);
        let digest_matches = count(ScoreSource::DigestMatch);
        let computed = count(ScoreSource::Computed);

        let fresh = scored
            .iter()
            .filter(|p| p.is_new())
            .map(|p| p.to_cached())
            .collect();
        let added = cache.merge(fresh)?;
        info!(added, cached_total = cache.len(), "scan cache updated");

        // Phase 5: Reporting
        phase(events, PipelinePhase::Reporting);
        let report = DuplicateReport::build(&scored, config.threshold, start_time.elapsed());
        let report_path = report.persist(&metadata.report())?;

        Ok(PipelineResult {
            report,
            report_path,
            total_images: records.len(),
            added_images: sync.added.len(),
            removed_images: sync.removed.len(),
            thumbnails_generated,
            total_pairs,
            cache_hits,
            digest_matches,
            computed,
            worker_retries,
            errors,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

/// Save the scores finished before a failed or cancelled comparison phase,
/// then hand back the error that stopped it
fn keep_finished_scores(
    cache: &mut ScanCache,
    finished: &Mutex<Vec<CachedComparison>>,
    error: WorkerError,
) -> DuplicateFinderError {
    let partial = finished
        .lock()
        .map(|mut scores| std::mem::take(&mut *scores))
        .unwrap_or_default();

    if !partial.is_empty() {
        match cache.merge(partial) {
            Ok(added) => info!(added, "kept scores from the interrupted comparison phase"),
            Err(merge_error) => warn!(%merge_error, "could not save partial scores"),
        }
    }
    error.into()
}

fn phase(events: &EventSender, phase: PipelinePhase) {
    events.send(Event::Pipeline(PipelineEvent::PhaseChanged { phase }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::InMemoryCacheBackend;
    use crate::core::comparator::MismatchThreshold;
    use crate::events::EventChannel;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FixedComparator {
        score: f64,
        calls: AtomicUsize,
    }

    impl ImageComparator for FixedComparator {
        fn compare(&self, _: &DynamicImage, _: &DynamicImage) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.score
        }
    }

    fn write_png(dir: &Path, name: &str, shade: u8) -> PathBuf {
        let img = ImageBuffer::from_pixel(8, 8, Rgb([shade, shade, shade]));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn config(dir: &Path) -> DedupConfig {
        DedupConfig::builder(dir)
            .worker_count(2)
            .threshold(MismatchThreshold::new(50.0).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn empty_directory_reports_no_duplicates() {
        let temp_dir = TempDir::new().unwrap();

        let result = Pipeline::builder(config(temp_dir.path()))
            .cache_backend(Arc::new(InMemoryCacheBackend::new()))
            .build()
            .run()
            .unwrap();

        assert_eq!(result.total_images, 0);
        assert_eq!(result.total_pairs, 0);
        assert!(!result.report.has_duplicates());
        assert!(result.report_path.is_none());
    }

    #[test]
    fn second_run_answers_every_pair_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.path(), "a.png", 10);
        write_png(temp_dir.path(), "b.png", 120);
        write_png(temp_dir.path(), "c.png", 240);
        let backend = Arc::new(InMemoryCacheBackend::new());

        let first = Arc::new(FixedComparator {
            score: 30.0,
            calls: AtomicUsize::new(0),
        });
        let result = Pipeline::builder(config(temp_dir.path()))
            .comparator(first.clone())
            .cache_backend(backend.clone())
            .build()
            .run()
            .unwrap();
        assert_eq!(result.computed, 3);
        assert_eq!(first.calls.load(Ordering::SeqCst), 3);

        let second = Arc::new(FixedComparator {
            score: 99.0,
            calls: AtomicUsize::new(0),
        });
        let result = Pipeline::builder(config(temp_dir.path()))
            .comparator(second.clone())
            .cache_backend(backend)
            .build()
            .run()
            .unwrap();

        assert_eq!(result.cache_hits, 3);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert!(result
            .report
            .candidates()
            .iter()
            .all(|c| c.mismatch_percentage == 30.0));
    }

    #[test]
    fn phases_are_announced_in_order() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.path(), "a.png", 10);
        write_png(temp_dir.path(), "b.png", 10);
        let (sender, receiver) = EventChannel::new();

        Pipeline::builder(config(temp_dir.path()))
            .cache_backend(Arc::new(InMemoryCacheBackend::new()))
            .build()
            .run_with_events(&sender)
            .unwrap();
        drop(sender);

        let phases: Vec<PipelinePhase> = receiver
            .iter()
            .filter_map(|e| match e {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                PipelinePhase::Scanning,
                PipelinePhase::Registering,
                PipelinePhase::Thumbnailing,
                PipelinePhase::Comparing,
                PipelinePhase::Reporting,
            ]
        );
    }

    #[test]
    fn cancelled_run_reports_cancellation() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.path(), "a.png", 10);
        write_png(temp_dir.path(), "b.png", 200);
        let token = CancellationToken::new();
        token.cancel();

        let err = Pipeline::builder(config(temp_dir.path()))
            .cache_backend(Arc::new(InMemoryCacheBackend::new()))
            .cancellation(token)
            .build()
            .run()
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    struct NanComparator;

    impl ImageComparator for NanComparator {
        fn compare(&self, _: &DynamicImage, _: &DynamicImage) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn unusable_score_does_not_poison_the_store() {
        let temp_dir = TempDir::new().unwrap();
        write_png(temp_dir.path(), "a.png", 10);
        write_png(temp_dir.path(), "b.png", 200);

        let first = Pipeline::builder(config(temp_dir.path()))
            .comparator(Arc::new(NanComparator))
            .build()
            .run()
            .unwrap();
        assert_eq!(first.computed, 0);
        assert_eq!(first.errors.len(), 1);

        let second = Pipeline::builder(config(temp_dir.path()))
            .build()
            .run()
            .unwrap();
        assert_eq!(second.cache_hits, 0);
        assert_eq!(second.computed, 1);
    }

    /// Cancels the run once it has been asked `after` times
    struct CancellingComparator {
        token: CancellationToken,
        after: usize,
        calls: AtomicUsize,
    }

    impl ImageComparator for CancellingComparator {
        fn compare(&self, _: &DynamicImage, _: &DynamicImage) -> f64 {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.token.cancel();
            }
            40.0
        }
    }

    #[test]
    fn cancelled_comparison_keeps_finished_scores() {
        let temp_dir = TempDir::new().unwrap();
        for (i, shade) in [10u8, 70, 130, 190].iter().enumerate() {
            write_png(temp_dir.path(), &format!("{}.png", i), *shade);
        }
        let backend = Arc::new(InMemoryCacheBackend::new());
        let token = CancellationToken::new();
        let single_worker = DedupConfig::builder(temp_dir.path())
            .worker_count(1)
            .build()
            .unwrap();

        let err = Pipeline::builder(single_worker.clone())
            .comparator(Arc::new(CancellingComparator {
                token: token.clone(),
                after: 2,
                calls: AtomicUsize::new(0),
            }))
            .cache_backend(backend.clone())
            .cancellation(token)
            .build()
            .run()
            .unwrap_err();
        assert!(err.is_cancelled());

        let saved = backend.snapshot().len();
        assert!((1..6).contains(&saved), "saved {} scores", saved);

        let rerun = Pipeline::builder(single_worker)
            .cache_backend(backend)
            .build()
            .run()
            .unwrap();
        assert_eq!(rerun.cache_hits, saved);
        assert_eq!(rerun.computed, 6 - saved);
    }
}
