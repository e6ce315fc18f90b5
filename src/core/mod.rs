//! # Core Module
//!
//! The UI-agnostic duplicate detection engine.
//!
//! ## Modules
//! - `scanner` - Discovers images under the root directory
//! - `registry` - Gives every image a stable id and a content digest
//! - `hasher` - Computes content digests
//! - `thumbnail` - Generates the bounded JPEG previews
//! - `comparator` - Scores two images by their mismatching pixels
//! - `pairs` - Builds and scores the pairwise work list
//! - `orchestrator` - Runs work on a watched pool of worker threads
//! - `cache` - Persists pair scores between runs
//! - `reporter` - Filters, orders and saves the duplicate report
//! - `pipeline` - Orchestrates the full workflow
//! - `config` - Run configuration and metadata locations

pub mod cache;
pub mod comparator;
pub mod config;
pub mod decode;
pub mod hasher;
pub mod orchestrator;
pub mod pairs;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod scanner;
pub mod storage;
pub mod thumbnail;

// Re-export commonly used types
pub use comparator::{MatchType, MismatchThreshold};
pub use config::DedupConfig;
pub use pipeline::{Pipeline, PipelineResult};
pub use registry::{ImageRecord, RecordId};
pub use reporter::{DuplicateCandidate, DuplicateReport};
