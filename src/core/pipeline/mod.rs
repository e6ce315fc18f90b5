//! # Pipeline Module
//!
//! Runs the full duplicate detection workflow over one directory.
//!
//! ## Pipeline Stages
//! 1. **Scan** - Discover candidate images under the root
//! 2. **Register** - Reconcile the file registry (new ids, removed files)
//! 3. **Thumbnail** - Generate missing previews on the worker pool
//! 4. **Compare** - Score every pair, answering known pairs from the cache
//! 5. **Report** - Filter by threshold, print and save the report
//!
//! ## Parallelism
//! Thumbnailing and comparing run on the work orchestrator; new files are
//! digested with rayon.

mod executor;

pub use executor::{Pipeline, PipelineBuilder, PipelineResult};
