//! # Registry Module
//!
//! The persisted identity mapping from file path to a stable id and a
//! content digest.
//!
//! ## Reconciliation
//! Each run, [`FileRegistry::sync`] compares the registry with what the
//! scanner found:
//! - a path seen for the first time gets a fresh id and a digest
//! - a known path that disappeared loses its record
//! - a known path that is still there is left untouched (its digest is
//!   not recomputed, even if the file changed)
//!
//! The full record set is then written back with [`FileRegistry::save`].
//! Records are stored sorted by path, so syncing an unchanged listing
//! rewrites a byte-identical file.

mod record;

pub use record::{ImageRecord, RecordId};

use crate::core::hasher::ContentHasher;
use crate::core::storage::{read_json, write_json_atomic};
use crate::error::{FileAccessError, RegistryError};
use crate::events::{Event, EventSender, RegistryEvent};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one reconciliation
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Records created for newly discovered paths
    pub added: Vec<ImageRecord>,
    /// Records dropped because their path is gone
    pub removed: Vec<ImageRecord>,
    /// New files that could not be digested and were left out
    pub skipped: Vec<FileAccessError>,
}

impl SyncReport {
    /// True when the registry did not change
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Registry of known image files, backed by a JSON store
#[derive(Debug)]
pub struct FileRegistry {
    store_path: PathBuf,
    records: BTreeMap<PathBuf, ImageRecord>,
}

impl FileRegistry {
    /// Load the registry stored at `store_path`; a missing store is empty.
    pub fn open(store_path: &Path) -> Result<Self, RegistryError> {
        let stored: Vec<ImageRecord> = read_json(store_path)?.unwrap_or_default();

        let mut records = BTreeMap::new();
        let mut ids = HashSet::new();
        for record in stored {
            if !ids.insert(record.id) {
                return Err(RegistryError::Corrupted {
                    path: store_path.to_path_buf(),
                    reason: format!("id {} is used by more than one record", record.id),
                });
            }
            if let Some(previous) = records.insert(record.path.clone(), record) {
                return Err(RegistryError::Corrupted {
                    path: store_path.to_path_buf(),
                    reason: format!("path {} is registered twice", previous.path.display()),
                });
            }
        }

        debug!(records = records.len(), path = %store_path.display(), "loaded file registry");

        Ok(Self {
            store_path: store_path.to_path_buf(),
            records,
        })
    }

    /// Where this registry is persisted
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&ImageRecord> {
        self.records.get(path)
    }

    /// All records, ordered by path
    pub fn records(&self) -> Vec<ImageRecord> {
        self.records.values().cloned().collect()
    }

    /// Ids of every live record
    pub fn ids(&self) -> HashSet<RecordId> {
        self.records.values().map(|r| r.id).collect()
    }

    /// Reconcile the registry with the paths the scanner just reported.
    ///
    /// New files are digested in parallel. A file that cannot be read is
    /// skipped with a warning and simply stays unregistered until a later
    /// run can read it. Nothing is written; call [`save`](Self::save).
    pub fn sync(
        &mut self,
        discovered: &[PathBuf],
        hasher: &dyn ContentHasher,
        events: &EventSender,
    ) -> SyncReport {
        let live: HashSet<&PathBuf> = discovered.iter().collect();
        let mut report = SyncReport::default();

        let gone: Vec<PathBuf> = self
            .records
            .keys()
            .filter(|path| !live.contains(path))
            .cloned()
            .collect();
        for path in gone {
            if let Some(record) = self.records.remove(&path) {
                debug!(id = %record.id, path = %path.display(), "file disappeared");
                report.removed.push(record);
            }
        }

        let mut new_paths: Vec<&PathBuf> = live
            .into_iter()
            .filter(|path| !self.records.contains_key(*path))
            .collect();
        new_paths.sort();

        let digests: Vec<(PathBuf, Result<String, FileAccessError>)> = new_paths
            .par_iter()
            .map(|path| ((*path).clone(), hasher.digest_file(path)))
            .collect();

        for (path, digest) in digests {
            match digest {
                Ok(digest) => {
                    let record = ImageRecord::new(path.clone(), digest);
                    self.records.insert(path, record.clone());
                    report.added.push(record);
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable file");
                    events.send(Event::Registry(RegistryEvent::DigestFailed {
                        path,
                        message: error.to_string(),
                    }));
                    report.skipped.push(error);
                }
            }
        }

        events.send(Event::Registry(RegistryEvent::Synced {
            added: report.added.len(),
            removed: report.removed.len(),
            skipped: report.skipped.len(),
            total: self.records.len(),
        }));

        report
    }

    /// Write every record back to the store in one pass.
    pub fn save(&self) -> Result<(), RegistryError> {
        let records: Vec<&ImageRecord> = self.records.values().collect();
        write_json_atomic(&self.store_path, &records)?;
        Ok(())
    }
}
