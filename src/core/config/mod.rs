//! # Config Module
//!
//! The run configuration, built once at start-up and passed by reference
//! to every component.
//!
//! ## Metadata Layout
//! Everything the tool persists lives in a hidden directory inside the
//! scanned root. The scanner always skips it.
//!
//! ```text
//! <root>/.imgdup/
//!     registry.json               known files: id, path, digest
//!     scan-cache.json             previously computed pair scores
//!     scan-cache.db               same, when the SQLite backend is selected
//!     ignored-combinations.json   reserved for user-marked false positives
//!     thumbnails/<id>.jpg         one preview per registered file
//!     result.txt                  last duplicate report
//! ```

use crate::core::comparator::MismatchThreshold;
use crate::core::registry::RecordId;
use crate::error::{DuplicateFinderError, ScanError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the metadata directory created inside the scanned root
pub const METADATA_DIR_NAME: &str = ".imgdup";

/// Workers used when none (or an invalid count) is requested
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default watchdog deadline for a silent worker
pub const DEFAULT_WORKER_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of extra attempts a chunk gets after a stall or crash
pub const DEFAULT_WORKER_RETRIES: u32 = 2;

/// Box a preview must fit inside, aspect ratio preserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// The preview size used by default (200x200)
    pub const PREVIEW: BoundingBox = BoundingBox {
        width: 200,
        height: 200,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an image of `width`x`height` scaled to fit inside the
    /// box. Images that already fit are left at their size.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (0, 0);
        }
        if width <= self.width && height <= self.height {
            return (width, height);
        }

        let scale = f64::min(
            self.width as f64 / width as f64,
            self.height as f64 / height as f64,
        );
        let fitted_w = ((width as f64 * scale).round() as u32).clamp(1, self.width);
        let fitted_h = ((height as f64 * scale).round() as u32).clamp(1, self.height);
        (fitted_w, fitted_h)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::PREVIEW
    }
}

/// Storage used for the scan cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackendKind {
    /// Pretty-printed JSON list, rewritten in one pass
    #[default]
    Json,
    /// SQLite table, rewritten inside one transaction
    Sqlite,
}

/// Paths of everything persisted under the metadata directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPaths {
    dir: PathBuf,
}

impl MetadataPaths {
    /// Metadata paths for a scan rooted at `root`
    pub fn for_root(root: &Path) -> Self {
        Self {
            dir: root.join(METADATA_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry(&self) -> PathBuf {
        self.dir.join("registry.json")
    }

    pub fn scan_cache(&self, backend: CacheBackendKind) -> PathBuf {
        match backend {
            CacheBackendKind::Json => self.dir.join("scan-cache.json"),
            CacheBackendKind::Sqlite => self.dir.join("scan-cache.db"),
        }
    }

    /// Reserved for user-marked false positives; nothing reads it yet.
    pub fn ignored_combinations(&self) -> PathBuf {
        self.dir.join("ignored-combinations.json")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.dir.join("thumbnails")
    }

    /// Preview file for one record, namespaced by id
    pub fn thumbnail(&self, id: &RecordId) -> PathBuf {
        self.thumbnails_dir().join(format!("{}.jpg", id))
    }

    pub fn report(&self) -> PathBuf {
        self.dir.join("result.txt")
    }
}

/// Configuration for one run
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Canonicalised directory being scanned
    pub root: PathBuf,
    /// Upper bound on parallel workers (always at least 1)
    pub worker_count: usize,
    /// Pairs scoring strictly below this are duplicate candidates
    pub threshold: MismatchThreshold,
    /// Preview bounding box
    pub bounding_box: BoundingBox,
    /// Whether the thumbnail phase runs at all
    pub generate_thumbnails: bool,
    /// Compare previews instead of originals when a preview exists
    pub compare_thumbnails: bool,
    /// Watchdog deadline per chunk attempt (None = wait forever)
    pub worker_idle_timeout: Option<Duration>,
    /// Extra attempts per chunk before the run fails
    pub max_worker_retries: u32,
    /// Scan cache storage
    pub cache_backend: CacheBackendKind,
    /// Include hidden files and directories in the scan
    pub include_hidden: bool,
    /// Derived metadata locations
    pub metadata: MetadataPaths,
}

impl DedupConfig {
    /// Start building a configuration for `root`
    pub fn builder(root: impl Into<PathBuf>) -> DedupConfigBuilder {
        DedupConfigBuilder::new(root.into())
    }

    /// Scan cache location for the selected backend
    pub fn scan_cache_path(&self) -> PathBuf {
        self.metadata.scan_cache(self.cache_backend)
    }
}

/// Builder for [`DedupConfig`]
#[derive(Debug, Clone)]
pub struct DedupConfigBuilder {
    root: PathBuf,
    worker_count: usize,
    threshold: MismatchThreshold,
    bounding_box: BoundingBox,
    generate_thumbnails: bool,
    compare_thumbnails: bool,
    worker_idle_timeout: Option<Duration>,
    max_worker_retries: u32,
    cache_backend: CacheBackendKind,
    include_hidden: bool,
}

impl DedupConfigBuilder {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            worker_count: DEFAULT_WORKER_COUNT,
            threshold: MismatchThreshold::default(),
            bounding_box: BoundingBox::default(),
            generate_thumbnails: true,
            compare_thumbnails: true,
            worker_idle_timeout: Some(DEFAULT_WORKER_IDLE_TIMEOUT),
            max_worker_retries: DEFAULT_WORKER_RETRIES,
            cache_backend: CacheBackendKind::default(),
            include_hidden: false,
        }
    }

    /// Number of parallel workers; zero is bumped to one
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    pub fn threshold(mut self, threshold: MismatchThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }

    pub fn generate_thumbnails(mut self, enabled: bool) -> Self {
        self.generate_thumbnails = enabled;
        self
    }

    pub fn compare_thumbnails(mut self, enabled: bool) -> Self {
        self.compare_thumbnails = enabled;
        self
    }

    pub fn worker_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    pub fn max_worker_retries(mut self, retries: u32) -> Self {
        self.max_worker_retries = retries;
        self
    }

    pub fn cache_backend(mut self, backend: CacheBackendKind) -> Self {
        self.cache_backend = backend;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Validate the root and freeze the configuration.
    ///
    /// Fails with an invalid-input error when the root is missing or is not
    /// a directory; nothing is created on disk.
    pub fn build(self) -> Result<DedupConfig, DuplicateFinderError> {
        if !self.root.exists() {
            return Err(ScanError::DirectoryNotFound { path: self.root }.into());
        }
        if !self.root.is_dir() {
            return Err(ScanError::NotADirectory { path: self.root }.into());
        }

        let root = self
            .root
            .canonicalize()
            .map_err(|source| ScanError::ReadDirectory {
                path: self.root.clone(),
                source,
            })?;

        if self.bounding_box.width == 0 || self.bounding_box.height == 0 {
            return Err(DuplicateFinderError::Config(
                "preview bounding box must be at least 1x1".to_string(),
            ));
        }

        let metadata = MetadataPaths::for_root(&root);

        Ok(DedupConfig {
            root,
            worker_count: self.worker_count,
            threshold: self.threshold,
            bounding_box: self.bounding_box,
            generate_thumbnails: self.generate_thumbnails,
            compare_thumbnails: self.compare_thumbnails,
            worker_idle_timeout: self.worker_idle_timeout,
            max_worker_retries: self.max_worker_retries,
            cache_backend: self.cache_backend,
            include_hidden: self.include_hidden,
            metadata,
        })
    }
}

/// Interpret a user-supplied thread count.
///
/// Anything that is not a positive integer keeps the default.
pub fn parse_worker_count(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|count| *count > 0)
        .unwrap_or(DEFAULT_WORKER_COUNT)
}
