//! # Reporter Module
//!
//! Turns scored pairs into the duplicate report.
//!
//! Only pairs scoring strictly below the threshold become candidates.
//! With no candidates the report is a one-line "no duplicates" message and
//! nothing is written; otherwise each candidate gets a block listing both
//! paths and the score, and the text is saved to `result.txt` in the
//! metadata directory.

mod export;

pub use export::{export_json, export_text, format_elapsed, ExportFormat};

use crate::core::comparator::{MatchType, MismatchThreshold};
use crate::core::pairs::ScoredPair;
use crate::core::storage::write_bytes_atomic;
use crate::error::ReportError;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Two files that are likely the same picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub first: PathBuf,
    pub second: PathBuf,
    pub mismatch_percentage: f64,
    pub match_type: MatchType,
}

/// Result of one run, ready to print
#[derive(Debug, Clone)]
pub enum DuplicateReport {
    NoDuplicates {
        elapsed: Duration,
    },
    Duplicates {
        /// Sorted by score, then by paths
        candidates: Vec<DuplicateCandidate>,
        threshold: f64,
        elapsed: Duration,
        generated_at: DateTime<Local>,
    },
}

impl DuplicateReport {
    /// Filter `pairs` by `threshold` and order the survivors.
    pub fn build(pairs: &[ScoredPair], threshold: MismatchThreshold, elapsed: Duration) -> Self {
        let mut candidates: Vec<DuplicateCandidate> = pairs
            .iter()
            .filter(|pair| threshold.is_duplicate(pair.mismatch_percentage))
            .map(|pair| {
                let (first, second) = ordered_paths(&pair.first.path, &pair.second.path);
                DuplicateCandidate {
                    first,
                    second,
                    mismatch_percentage: pair.mismatch_percentage,
                    match_type: MatchType::from_mismatch(pair.mismatch_percentage),
                }
            })
            .collect();

        if candidates.is_empty() {
            return DuplicateReport::NoDuplicates { elapsed };
        }

        candidates.sort_by(|a, b| {
            a.mismatch_percentage
                .partial_cmp(&b.mismatch_percentage)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.first.cmp(&b.first))
                .then_with(|| a.second.cmp(&b.second))
        });

        DuplicateReport::Duplicates {
            candidates,
            threshold: threshold.value(),
            elapsed,
            generated_at: Local::now(),
        }
    }

    pub fn candidates(&self) -> &[DuplicateCandidate] {
        match self {
            DuplicateReport::NoDuplicates { .. } => &[],
            DuplicateReport::Duplicates { candidates, .. } => candidates,
        }
    }

    pub fn has_duplicates(&self) -> bool {
        !self.candidates().is_empty()
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            DuplicateReport::NoDuplicates { elapsed }
            | DuplicateReport::Duplicates { elapsed, .. } => *elapsed,
        }
    }

    /// The report as printed
    pub fn to_text(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = export_text(self, &mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Save the text report to `path` when there is something to report.
    ///
    /// Returns the path written, or `None` for a "no duplicates" report. A
    /// report left by an earlier run is removed in that case, since its pairs
    /// no longer hold.
    pub fn persist(&self, path: &Path) -> Result<Option<PathBuf>, ReportError> {
        if !self.has_duplicates() {
            return match std::fs::remove_file(path) {
                Ok(()) => Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(source) => Err(ReportError::WriteFailed {
                    path: path.to_path_buf(),
                    source,
                }),
            };
        }

        write_bytes_atomic(path, self.to_text().as_bytes()).map_err(|source| {
            ReportError::WriteFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(Some(path.to_path_buf()))
    }
}

fn ordered_paths(a: &Path, b: &Path) -> (PathBuf, PathBuf) {
    if a <= b {
        (a.to_path_buf(), b.to_path_buf())
    } else {
        (b.to_path_buf(), a.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::PairKey;
    use crate::core::pairs::ScoreSource;
    use crate::core::registry::ImageRecord;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn scored(a: &str, b: &str, score: f64) -> ScoredPair {
        let first = ImageRecord::new(PathBuf::from(a), format!("{}-digest", a));
        let second = ImageRecord::new(PathBuf::from(b), format!("{}-digest", b));
        ScoredPair {
            key: PairKey::new(first.id, second.id),
            first: Arc::new(first),
            second: Arc::new(second),
            mismatch_percentage: score,
            source: ScoreSource::Computed,
        }
    }

    fn threshold(value: f64) -> MismatchThreshold {
        MismatchThreshold::new(value).unwrap()
    }

    #[test]
    fn keeps_only_pairs_strictly_below_threshold() {
        let pairs = vec![
            scored("/a.jpg", "/b.jpg", 0.0),
            scored("/a.jpg", "/c.jpg", 50.0),
            scored("/b.jpg", "/c.jpg", 49.99),
        ];

        let report = DuplicateReport::build(&pairs, threshold(50.0), Duration::ZERO);

        assert_eq!(report.candidates().len(), 2);
        assert!(report
            .candidates()
            .iter()
            .all(|c| c.mismatch_percentage < 50.0));
    }

    #[test]
    fn candidates_sorted_by_score_then_path() {
        let pairs = vec![
            scored("/z.jpg", "/y.jpg", 10.0),
            scored("/b.jpg", "/a.jpg", 10.0),
            scored("/m.jpg", "/n.jpg", 1.0),
        ];

        let report = DuplicateReport::build(&pairs, threshold(20.0), Duration::ZERO);
        let firsts: Vec<&Path> = report.candidates().iter().map(|c| c.first.as_path()).collect();

        assert_eq!(
            firsts,
            vec![Path::new("/m.jpg"), Path::new("/a.jpg"), Path::new("/y.jpg")]
        );
        assert_eq!(report.candidates()[1].second, PathBuf::from("/b.jpg"));
    }

    #[test]
    fn empty_report_writes_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("result.txt");
        let pairs = vec![scored("/a.jpg", "/b.jpg", 80.0)];

        let report = DuplicateReport::build(&pairs, threshold(20.0), Duration::from_millis(12));

        assert!(!report.has_duplicates());
        assert_eq!(report.persist(&target).unwrap(), None);
        assert!(!target.exists());
        assert!(report.to_text().contains("No duplicates found"));
        assert!(report.to_text().contains("12ms"));
    }

    #[test]
    fn empty_report_removes_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("result.txt");
        let pairs = vec![scored("/a.jpg", "/b.jpg", 3.0)];
        DuplicateReport::build(&pairs, threshold(20.0), Duration::ZERO)
            .persist(&target)
            .unwrap();
        assert!(target.exists());

        let report = DuplicateReport::build(&pairs, threshold(1.0), Duration::ZERO);

        assert_eq!(report.persist(&target).unwrap(), None);
        assert!(!target.exists());
    }

    #[test]
    fn report_file_lists_both_paths_and_score() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join(".imgdup").join("result.txt");
        let pairs = vec![scored("/photos/a.jpg", "/photos/b.jpg", 3.5)];

        let report = DuplicateReport::build(&pairs, threshold(20.0), Duration::from_secs(2));
        let written = report.persist(&target).unwrap();

        assert_eq!(written, Some(target.clone()));
        let text = std::fs::read_to_string(&target).unwrap();
        assert!(text.contains("/photos/a.jpg"));
        assert!(text.contains("/photos/b.jpg"));
        assert!(text.contains("3.50% mismatch"));
        assert!(text.contains("Near-Exact Match"));
    }

    #[test]
    fn json_export_lists_candidates() {
        let pairs = vec![scored("/a.jpg", "/b.jpg", 0.0)];
        let report = DuplicateReport::build(&pairs, threshold(20.0), Duration::ZERO);

        let mut buffer = Vec::new();
        export_json(&report, &mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        assert_eq!(value["duplicates_found"], 1);
        assert_eq!(value["candidates"][0]["match_type"], "Exact");
    }
}
