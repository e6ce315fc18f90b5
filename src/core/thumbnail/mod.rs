//! # Thumbnail Module
//!
//! Keeps one JPEG preview per registered record under
//! `<root>/.imgdup/thumbnails/<id>.jpg`.
//!
//! Previews are immutable once written: a record whose preview already
//! exists is skipped. Generation runs on the work orchestrator, one task per
//! record; since ids are unique no two workers ever write the same file.
//! Files are written atomically, so a crashed run never leaves a truncated
//! preview behind that a later run would skip.

mod generator;

pub use generator::{JpegThumbnailGenerator, ThumbnailGenerator, PREVIEW_QUALITY};

use crate::core::config::{BoundingBox, MetadataPaths};
use crate::core::orchestrator::WorkOrchestrator;
use crate::core::registry::{ImageRecord, RecordId};
use crate::core::storage::write_bytes_atomic;
use crate::error::{FileAccessError, WorkerError};
use crate::events::{EventSender, PipelinePhase};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// One "make sure this record has a preview" task
#[derive(Debug, Clone)]
pub struct ThumbnailTask {
    pub id: RecordId,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// What happened to one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    Generated,
    AlreadyPresent,
}

/// Totals for one thumbnail phase
#[derive(Debug, Default)]
pub struct ThumbnailReport {
    pub generated: usize,
    pub skipped_existing: usize,
    pub failed: Vec<FileAccessError>,
    /// Worker restarts during the phase
    pub retries: u32,
}

/// Generates missing previews for a set of records
pub struct ThumbnailPipeline {
    generator: Arc<dyn ThumbnailGenerator>,
    metadata: MetadataPaths,
    bounding_box: BoundingBox,
}

impl ThumbnailPipeline {
    pub fn new(
        generator: Arc<dyn ThumbnailGenerator>,
        metadata: MetadataPaths,
        bounding_box: BoundingBox,
    ) -> Self {
        Self {
            generator,
            metadata,
            bounding_box,
        }
    }

    /// One task per record, in record order
    pub fn tasks(&self, records: &[ImageRecord]) -> Vec<ThumbnailTask> {
        records
            .iter()
            .map(|record| ThumbnailTask {
                id: record.id,
                source: record.path.clone(),
                target: self.metadata.thumbnail(&record.id),
            })
            .collect()
    }

    /// Ensure every record has a preview.
    ///
    /// A record whose preview cannot be produced is skipped with a warning;
    /// only a worker failure or cancellation aborts the phase.
    pub fn run(
        &self,
        records: &[ImageRecord],
        orchestrator: &WorkOrchestrator,
        events: &EventSender,
    ) -> Result<ThumbnailReport, WorkerError> {
        let generator = Arc::clone(&self.generator);
        let bbox = self.bounding_box;

        let episode = orchestrator.run(
            PipelinePhase::Thumbnailing,
            self.tasks(records),
            move |task: &ThumbnailTask| ensure_preview(generator.as_ref(), bbox, task),
            events,
        )?;

        let mut report = ThumbnailReport {
            failed: episode.failures,
            retries: episode.retries,
            ..Default::default()
        };
        for outcome in episode.results {
            match outcome {
                ThumbnailOutcome::Generated => report.generated += 1,
                ThumbnailOutcome::AlreadyPresent => report.skipped_existing += 1,
            }
        }

        debug!(
            generated = report.generated,
            skipped = report.skipped_existing,
            failed = report.failed.len(),
            "thumbnail phase done"
        );
        Ok(report)
    }

    /// Delete the previews of records that left the registry.
    ///
    /// Returns how many files were removed.
    pub fn remove_previews(&self, removed: &[ImageRecord]) -> usize {
        removed
            .iter()
            .filter(|record| {
                let path = self.metadata.thumbnail(&record.id);
                match std::fs::remove_file(&path) {
                    Ok(()) => true,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                    Err(error) => {
                        warn!(path = %path.display(), %error, "could not delete stale preview");
                        false
                    }
                }
            })
            .count()
    }
}

fn ensure_preview(
    generator: &dyn ThumbnailGenerator,
    bbox: BoundingBox,
    task: &ThumbnailTask,
) -> Result<ThumbnailOutcome, FileAccessError> {
    if task.target.is_file() {
        return Ok(ThumbnailOutcome::AlreadyPresent);
    }

    let bytes = generator.generate(&task.source, bbox)?;
    write_bytes_atomic(&task.target, &bytes).map_err(|source| FileAccessError::Write {
        path: task.target.clone(),
        source,
    })?;

    Ok(ThumbnailOutcome::Generated)
}
