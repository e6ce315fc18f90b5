//! # Error Module
//!
//! Error types for the similar image finder.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, chunk numbers, what went wrong
//! - **Recovery hints** - corrupted stores say how to get going again
//! - **Local recovery** - a single unreadable file never aborts a run;
//!   only invalid input, store corruption and exhausted workers are fatal

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum DuplicateFinderError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("File access error: {0}")]
    FileAccess(#[from] FileAccessError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Report generation error: {0}")]
    Report(#[from] ReportError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DuplicateFinderError {
    /// Whether this error was caused by the command line input rather
    /// than by something going wrong during the run.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            DuplicateFinderError::Scan(
                ScanError::DirectoryNotFound { .. } | ScanError::NotADirectory { .. }
            ) | DuplicateFinderError::Config(_)
        )
    }

    /// Whether the run stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DuplicateFinderError::Worker(WorkerError::Cancelled))
    }
}

/// Errors that occur while discovering images
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Permission denied accessing: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single file could not be read, decoded or written.
///
/// Always recovered locally: the file or pair is skipped with a warning.
#[derive(Error, Debug)]
pub enum FileAccessError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode preview for {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compare {path}: {reason}")]
    Compare { path: PathBuf, reason: String },
}

impl FileAccessError {
    /// The file this error is about
    pub fn path(&self) -> &PathBuf {
        match self {
            FileAccessError::Read { path, .. }
            | FileAccessError::Decode { path, .. }
            | FileAccessError::Encode { path, .. }
            | FileAccessError::Write { path, .. }
            | FileAccessError::Compare { path, .. } => path,
        }
    }
}

/// Errors from the file registry store
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("File registry at {path} is corrupted ({reason}). Delete this file and run again to rebuild it.")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Failed to access file registry at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize file registry: {0}")]
    SerializationFailed(String),
}

/// Errors from the scan cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open scan cache at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Scan cache query failed: {0}")]
    QueryFailed(String),

    #[error("Scan cache at {path} is corrupted ({reason}). Delete this file and run again; scores will be recomputed.")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Failed to access scan cache at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize scan cache: {0}")]
    SerializationFailed(String),
}

/// A worker failed to report completion for its chunk
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker for chunk {chunk} stalled for more than {timeout:?} on each of {attempts} attempt(s)")]
    Stalled {
        chunk: usize,
        attempts: u32,
        timeout: Duration,
    },

    #[error("Worker for chunk {chunk} crashed on each of {attempts} attempt(s): {reason}")]
    Panicked {
        chunk: usize,
        attempts: u32,
        reason: String,
    },

    #[error("Failed to start worker thread for chunk {chunk}: {source}")]
    Spawn {
        chunk: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Run was cancelled")]
    Cancelled,
}

/// Errors that occur during report generation
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, DuplicateFinderError>;
