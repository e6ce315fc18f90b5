//! # Similar Image Finder
//!
//! Finds likely-duplicate images in a directory tree by comparing every pair
//! of images pixel by pixel.
//!
//! ## Core Philosophy
//! - **Never touch the photos** - everything derived lives under `.imgdup/`
//! - **Compare each pair once** - scores are cached between runs by file id
//! - **Survive bad files** - an unreadable image is skipped, not fatal
//!
//! ## Architecture
//! The library is split into a core engine (UI-agnostic) and presentation layers:
//! - `core` - The duplicate detection engine
//! - `events` - Event-driven progress reporting
//! - `error` - User-friendly error types
//! - `cli` - Command-line interface (binary only)

pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use error::{DuplicateFinderError, Result};

/// Initialize tracing for the application
///
/// Logs go to stderr so stdout stays clean for the report. `RUST_LOG`
/// overrides the default level. Calling this twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
