//! Directory walking implementation using walkdir.

use super::filter::{is_hidden, ImageFilter};
use super::{ImageScanner, ScanResult};
use crate::core::config::METADATA_DIR_NAME;
use crate::error::ScanError;
use crate::events::{Event, EventSender, ScanEvent};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Configuration for the directory scanner
#[derive(Debug, Clone, Default)]
pub struct ScanConfig {
    /// Whether to follow symbolic links
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
}

/// Scanner implementation using the walkdir crate
pub struct WalkDirScanner {
    config: ScanConfig,
    filter: ImageFilter,
}

impl WalkDirScanner {
    pub fn new(config: ScanConfig) -> Self {
        let mut filter = ImageFilter::new().with_hidden(config.include_hidden);
        if let Some(ref extensions) = config.extensions {
            filter = filter.with_extensions(extensions.clone());
        }
        Self { config, filter }
    }

    /// Whether the walk should descend into / yield this entry
    fn keep_entry(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        if entry.file_type().is_dir() {
            if entry.file_name() == METADATA_DIR_NAME {
                return false;
            }
            if !self.config.include_hidden && is_hidden(entry.path()) {
                return false;
            }
        }
        true
    }
}

impl ImageScanner for WalkDirScanner {
    fn scan(&self, root: &Path, events: &EventSender) -> Result<ScanResult, ScanError> {
        if !root.exists() {
            return Err(ScanError::DirectoryNotFound {
                path: root.to_path_buf(),
            });
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory {
                path: root.to_path_buf(),
            });
        }

        events.send(Event::Scan(ScanEvent::Started {
            root: root.to_path_buf(),
        }));

        let mut walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        if let Some(depth) = self.config.max_depth {
            walker = walker.max_depth(depth);
        }

        let mut result = ScanResult::default();

        for entry_result in walker.into_iter().filter_entry(|e| self.keep_entry(e)) {
            match entry_result {
                Ok(entry) => {
                    if !entry.file_type().is_file() || !self.filter.should_include(entry.path()) {
                        continue;
                    }
                    events.send(Event::Scan(ScanEvent::ImageFound {
                        path: entry.path().to_path_buf(),
                    }));
                    result.paths.push(entry.into_path());
                }
                Err(e) => {
                    let path = e.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    let error = if e.io_error().map(|io| io.kind())
                        == Some(std::io::ErrorKind::PermissionDenied)
                    {
                        ScanError::PermissionDenied { path: path.clone() }
                    } else {
                        ScanError::ReadDirectory {
                            path: path.clone(),
                            source: std::io::Error::other(e.to_string()),
                        }
                    };

                    tracing::warn!(%error, "scan error");
                    events.send(Event::Scan(ScanEvent::Error {
                        path,
                        message: error.to_string(),
                    }));
                    result.errors.push(error);
                }
            }
        }

        result.paths.sort();

        events.send(Event::Scan(ScanEvent::Completed {
            total_images: result.paths.len(),
        }));

        Ok(result)
    }
}
