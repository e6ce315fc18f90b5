//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted while a run is in progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Directory scanning events
    Scan(ScanEvent),
    /// File registry reconciliation events
    Registry(RegistryEvent),
    /// Fan-out/fan-in events from the work orchestrator
    Work(WorkEvent),
    /// Pipeline-level events
    Pipeline(PipelineEvent),
}

/// Events during the scanning phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// Scanning has started
    Started { root: PathBuf },
    /// An image was found
    ImageFound { path: PathBuf },
    /// An entry could not be read but scanning continues
    Error { path: PathBuf, message: String },
    /// Scanning completed
    Completed { total_images: usize },
}

/// Events from the file registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A new file could not be digested and was left out of the registry
    DigestFailed { path: PathBuf, message: String },
    /// Reconciliation finished
    Synced {
        added: usize,
        removed: usize,
        skipped: usize,
        total: usize,
    },
}

/// Events from one orchestrated fan-out episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkEvent {
    /// Workers were launched
    Started {
        phase: PipelinePhase,
        total: usize,
        workers: usize,
    },
    /// One more item was processed
    Progress(WorkProgress),
    /// A task inside a chunk failed and was skipped
    ItemFailed {
        phase: PipelinePhase,
        message: String,
    },
    /// A chunk was handed to a fresh worker after a stall or crash
    WorkerRetried {
        phase: PipelinePhase,
        chunk: usize,
        attempt: u32,
        reason: String,
    },
    /// Every worker reported completion
    Completed {
        phase: PipelinePhase,
        processed: usize,
        duration_ms: u64,
    },
}

/// Aggregated progress across all workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkProgress {
    /// Which phase this episode belongs to
    pub phase: PipelinePhase,
    /// Items processed so far (monotonic)
    pub processed: usize,
    /// Total items in the episode
    pub total: usize,
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started,
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline completed successfully
    Completed { summary: PipelineSummary },
    /// Pipeline was cancelled
    Cancelled,
    /// Pipeline encountered a fatal error
    Error { message: String },
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Scanning,
    Registering,
    Thumbnailing,
    Comparing,
    Reporting,
}

/// Summary of pipeline results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Images currently registered
    pub total_images: usize,
    /// Unordered pairs considered
    pub total_pairs: usize,
    /// Pairs answered by the scan cache
    pub cache_hits: usize,
    /// Pairs reported as duplicate candidates
    pub duplicate_pairs: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Scanning => write!(f, "Scanning"),
            PipelinePhase::Registering => write!(f, "Registering"),
            PipelinePhase::Thumbnailing => write!(f, "Generating previews"),
            PipelinePhase::Comparing => write!(f, "Comparing"),
            PipelinePhase::Reporting => write!(f, "Reporting"),
        }
    }
}
