//! # CLI Module
//!
//! Command-line interface for the similar image finder.
//!
//! ## Usage
//! ```bash
//! # Find similar images under ~/Pictures
//! imgdup ~/Pictures
//!
//! # More workers, looser cutoff
//! imgdup ~/Pictures --threads 8 --threshold 50
//!
//! # Compare full-size originals, keep scores in SQLite
//! imgdup ~/Pictures --compare-originals --cache-backend sqlite
//!
//! # JSON output
//! imgdup ~/Pictures --output json
//! ```

use clap::{Parser, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use similar_image_finder::core::comparator::MismatchThreshold;
use similar_image_finder::core::config::{
    parse_worker_count, CacheBackendKind, DedupConfig, DEFAULT_WORKER_COUNT,
};
use similar_image_finder::core::pipeline::{Pipeline, PipelineResult};
use similar_image_finder::core::reporter::{export_json, export_text, ExportFormat};
use similar_image_finder::error::DuplicateFinderError;
use similar_image_finder::events::{Event, EventChannel, PipelineEvent, WorkEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Exit status after Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// imgdup - find visually similar images in a directory tree
#[derive(Parser, Debug)]
#[command(name = "imgdup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to scan (recursively)
    directory: PathBuf,

    /// Number of parallel workers (positive integer, default 4)
    #[arg(short, long)]
    threads: Option<String>,

    /// Mismatch percentage below which two images are reported
    /// (0-100, or "strict" = 20 / "lenient" = 50) [default: strict]
    #[arg(long)]
    threshold: Option<MismatchThreshold>,

    /// Skip the preview generation phase
    #[arg(long)]
    no_thumbnails: bool,

    /// Compare the original files instead of their previews
    #[arg(long)]
    compare_originals: bool,

    /// Where pair scores are cached between runs
    #[arg(long, value_enum, default_value = "json")]
    cache_backend: CacheBackend,

    /// Seconds a worker may stay silent before its chunk is retried (0 = never)
    #[arg(long, value_name = "SECS")]
    worker_timeout: Option<u64>,

    /// Extra attempts per chunk after a worker stalls or crashes
    #[arg(long, value_name = "N")]
    retries: Option<u32>,

    /// Include hidden files and directories
    #[arg(long)]
    include_hidden: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CacheBackend {
    /// JSON file (default)
    Json,
    /// SQLite database
    Sqlite,
}

impl From<CacheBackend> for CacheBackendKind {
    fn from(backend: CacheBackend) -> Self {
        match backend {
            CacheBackend::Json => CacheBackendKind::Json,
            CacheBackend::Sqlite => CacheBackendKind::Sqlite,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

impl From<OutputFormat> for ExportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Pretty => ExportFormat::Text,
            OutputFormat::Json => ExportFormat::Json,
        }
    }
}

/// Run the CLI and map the outcome to a process exit status
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    similar_image_finder::init_tracing(cli.verbose);

    let term = Term::stderr();
    match run_scan(&cli, &term) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_cancelled() => {
            term.write_line(&format!("{} Cancelled", style("✗").yellow().bold()))
                .ok();
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(error) => {
            term.write_line(&format!("{} {}", style("error:").red().bold(), error))
                .ok();
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> Result<DedupConfig, DuplicateFinderError> {
    let workers = parse_worker_count(cli.threads.as_deref());
    if let Some(raw) = &cli.threads {
        if raw.trim().parse::<usize>().ok() != Some(workers) {
            warn!(
                threads = %raw,
                "--threads must be a positive integer; using {}",
                DEFAULT_WORKER_COUNT
            );
        }
    }

    let mut builder = DedupConfig::builder(&cli.directory)
        .worker_count(workers)
        .threshold(cli.threshold.unwrap_or_default())
        .generate_thumbnails(!cli.no_thumbnails)
        .compare_thumbnails(!cli.compare_originals)
        .cache_backend(cli.cache_backend.into())
        .include_hidden(cli.include_hidden);

    if let Some(secs) = cli.worker_timeout {
        let timeout = (secs > 0).then(|| Duration::from_secs(secs));
        builder = builder.worker_idle_timeout(timeout);
    }
    if let Some(retries) = cli.retries {
        builder = builder.max_worker_retries(retries);
    }

    builder.build()
}

/// The cutoff in effect, flagged when it was not chosen on the command line
fn threshold_label(cli: &Cli, config: &DedupConfig) -> String {
    match cli.threshold {
        Some(_) => format!("threshold {}", config.threshold),
        None => format!(
            "threshold {} (default; set --threshold to change)",
            config.threshold
        ),
    }
}

fn run_scan(cli: &Cli, term: &Term) -> Result<(), DuplicateFinderError> {
    let config = build_config(cli)?;
    let pretty = matches!(cli.output, OutputFormat::Pretty);
    let threshold = threshold_label(cli, &config);

    // Print header
    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("imgdup").bold().cyan(),
            style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line(&format!(
            "  {} with {} workers, {}",
            style(config.root.display()).bold(),
            config.worker_count,
            threshold
        ))
        .ok();
        term.write_line("").ok();
    } else {
        // stdout carries the JSON report; the cutoff in effect still goes to stderr
        term.write_line(&format!("imgdup: {}", threshold)).ok();
    }

    let pipeline = Pipeline::builder(config).build();

    let token = pipeline.cancellation_token();
    if let Err(error) = ctrlc::set_handler(move || token.cancel()) {
        warn!(%error, "could not install the Ctrl-C handler");
    }

    // Set up event handling
    let (sender, receiver) = EventChannel::new();

    // Progress bar for pretty output
    let progress = pretty.then(|| {
        let pb = ProgressBar::new(0);
        let bar_style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(bar_style);
        pb
    });

    let verbose = cli.verbose;

    // Handle events in a separate thread
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = progress.as_ref() else {
                continue;
            };
            match event {
                Event::Pipeline(PipelineEvent::PhaseChanged { phase }) => {
                    pb.set_message(phase.to_string());
                }
                Event::Work(WorkEvent::Started { phase, total, workers }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                    pb.set_message(format!("{} ({} workers)", phase, workers));
                }
                Event::Work(WorkEvent::Progress(p)) => {
                    pb.set_position(p.processed as u64);
                }
                Event::Work(WorkEvent::WorkerRetried {
                    phase,
                    chunk,
                    attempt,
                    reason,
                }) => {
                    pb.println(format!(
                        "  {} {} chunk {} restarted (attempt {}): {}",
                        style("!").yellow().bold(),
                        phase,
                        chunk,
                        attempt,
                        reason
                    ));
                }
                Event::Work(WorkEvent::ItemFailed { message, .. }) if verbose => {
                    pb.println(format!("  {} {}", style("skipped").dim(), message));
                }
                Event::Pipeline(
                    PipelineEvent::Completed { .. }
                    | PipelineEvent::Cancelled
                    | PipelineEvent::Error { .. },
                ) => {
                    pb.finish_and_clear();
                }
                _ => {}
            }
        }
    });

    // Run the pipeline
    let result = pipeline.run_with_events(&sender);

    // Drop sender to signal event thread to finish
    drop(sender);
    event_thread.join().ok();

    let result = result?;

    // Output results
    match ExportFormat::from(cli.output) {
        ExportFormat::Text => print_pretty_results(term, &result, verbose),
        ExportFormat::Json => print_json_results(&result),
    }

    Ok(())
}

fn print_pretty_results(term: &Term, result: &PipelineResult, verbose: bool) {
    term.write_line(&format!("{} Scan Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    // Summary
    term.write_line(&format!(
        "  {} images ({} new, {} removed) in {:.1}s",
        style(result.total_images).cyan(),
        result.added_images,
        result.removed_images,
        result.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!(
        "  {} pairs: {} cached, {} identical files, {} compared",
        style(result.total_pairs).cyan(),
        result.cache_hits,
        result.digest_matches,
        result.computed
    ))
    .ok();
    if result.thumbnails_generated > 0 {
        term.write_line(&format!(
            "  {} previews generated",
            style(result.thumbnails_generated).dim()
        ))
        .ok();
    }
    if result.worker_retries > 0 {
        term.write_line(&format!(
            "  {} worker restarts",
            style(result.worker_retries).yellow()
        ))
        .ok();
    }
    if !result.errors.is_empty() {
        term.write_line(&format!(
            "  {} files or pairs skipped{}",
            style(result.errors.len()).yellow(),
            if verbose { ":" } else { " (use --verbose for details)" }
        ))
        .ok();
        if verbose {
            for error in &result.errors {
                term.write_line(&format!("    {}", style(error).dim())).ok();
            }
        }
    }
    term.write_line("").ok();

    // The report itself goes to stdout
    let stdout = std::io::stdout();
    if let Err(error) = export_text(&result.report, stdout.lock()) {
        warn!(%error, "could not print the report");
    }

    if let Some(path) = &result.report_path {
        term.write_line("").ok();
        term.write_line(&format!(
            "{} {}",
            style("Report saved to").dim(),
            path.display()
        ))
        .ok();
    }

    // Footer
    term.write_line(&format!(
        "{}",
        style("No files were modified. Review the pairs before deleting anything.").dim()
    ))
    .ok();
}

fn print_json_results(result: &PipelineResult) {
    let stdout = std::io::stdout();
    if let Err(error) = export_json(&result.report, stdout.lock()) {
        warn!(%error, "could not print the report");
    }
}
