//! # Scanner Module
//!
//! Discovers candidate image files under the scan root.
//!
//! ## Supported Formats
//! JPEG, PNG, GIF, BMP, WebP and TIFF, matched by extension.
//!
//! The metadata directory inside the root is always skipped, so previews
//! and stores are never registered as images.
//!
//! ## Example
//! ```rust,ignore
//! use similar_image_finder::core::scanner::{ImageScanner, ScanConfig, WalkDirScanner};
//!
//! let scanner = WalkDirScanner::new(ScanConfig::default());
//! let found = scanner.scan(&root, &null_sender())?;
//! ```

mod filter;
mod walker;

pub use filter::{ImageFilter, DEFAULT_EXTENSIONS};
pub use walker::{ScanConfig, WalkDirScanner};

use crate::error::ScanError;
use crate::events::EventSender;
use std::path::{Path, PathBuf};

/// Result of a scan operation
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Candidate image paths, sorted
    pub paths: Vec<PathBuf>,
    /// Entries that could not be read (non-fatal)
    pub errors: Vec<ScanError>,
}

/// Source of candidate image paths
///
/// Implement this trait to feed the pipeline from somewhere other than a
/// directory walk (e.g., in tests).
pub trait ImageScanner: Send + Sync {
    /// List the images currently under `root`
    fn scan(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError>;
}
