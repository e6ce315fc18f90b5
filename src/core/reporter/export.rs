//! Rendering of duplicate reports.
//!
//! Plain text is what gets printed and saved to `result.txt`; JSON is for
//! scripts.

use super::{DuplicateCandidate, DuplicateReport};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Text,
    Json,
}

/// Write the human-readable report
pub fn export_text<W: Write>(report: &DuplicateReport, mut writer: W) -> std::io::Result<()> {
    match report {
        DuplicateReport::NoDuplicates { elapsed, .. } => {
            writeln!(writer, "No duplicates found.")?;
            writeln!(writer, "Completed in {}.", format_elapsed(*elapsed))?;
        }
        DuplicateReport::Duplicates {
            candidates,
            threshold,
            elapsed,
            generated_at,
        } => {
            writeln!(
                writer,
                "Similar images: {} pair(s) below {:.2}% mismatch",
                candidates.len(),
                threshold
            )?;
            writeln!(writer, "Generated {}", generated_at.format("%Y-%m-%d %H:%M:%S"))?;
            writeln!(writer, "Completed in {}.", format_elapsed(*elapsed))?;

            for (index, candidate) in candidates.iter().enumerate() {
                writeln!(writer)?;
                write_block(&mut writer, index + 1, candidate)?;
            }
        }
    }
    Ok(())
}

fn write_block<W: Write>(
    writer: &mut W,
    number: usize,
    candidate: &DuplicateCandidate,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "[{}] {} - {:.2}% mismatch",
        number, candidate.match_type, candidate.mismatch_percentage
    )?;
    writeln!(writer, "    {}", display_path(&candidate.first))?;
    writeln!(writer, "    {}", display_path(&candidate.second))
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    duplicates_found: usize,
    threshold: Option<f64>,
    elapsed_ms: u64,
    candidates: &'a [DuplicateCandidate],
}

/// Write the report as pretty JSON
pub fn export_json<W: Write>(report: &DuplicateReport, mut writer: W) -> std::io::Result<()> {
    let json = JsonReport {
        duplicates_found: report.candidates().len(),
        threshold: match report {
            DuplicateReport::Duplicates { threshold, .. } => Some(*threshold),
            DuplicateReport::NoDuplicates { .. } => None,
        },
        elapsed_ms: report.elapsed().as_millis() as u64,
        candidates: report.candidates(),
    };
    serde_json::to_writer_pretty(&mut writer, &json)?;
    writeln!(writer)
}

/// "850ms", "3.42s", "2m 05s"
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}
