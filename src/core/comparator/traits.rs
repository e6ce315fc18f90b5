//! Comparator and threshold definitions.

use crate::error::DuplicateFinderError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Perceptual comparison of two decoded images.
///
/// Implementations return a mismatch percentage in `[0, 100]` where `0`
/// means identical content. They must be deterministic: the same two images
/// always give the same score, so a cached score can stand in for a call.
pub trait ImageComparator: Send + Sync {
    /// Score how different `first` and `second` look
    fn compare(&self, first: &DynamicImage, second: &DynamicImage) -> f64;

    /// Short name used in logs
    fn name(&self) -> &'static str {
        "comparator"
    }
}

/// Mismatch percentage cutoff deciding what counts as a duplicate.
///
/// Pairs scoring strictly below the threshold are reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MismatchThreshold(f64);

impl MismatchThreshold {
    /// Cutoff of the strict preset
    pub const STRICT: f64 = 20.0;
    /// Cutoff of the lenient preset
    pub const LENIENT: f64 = 50.0;

    /// Create a threshold; must be a finite percentage in `[0, 100]`
    pub fn new(percentage: f64) -> Result<Self, DuplicateFinderError> {
        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(DuplicateFinderError::Config(format!(
                "mismatch threshold must be between 0 and 100, got {}",
                percentage
            )));
        }
        Ok(Self(percentage))
    }

    /// Few false positives; near-identical pictures only (20%)
    pub fn strict() -> Self {
        Self(Self::STRICT)
    }

    /// Also catches crops, re-encodes and edits (50%)
    pub fn lenient() -> Self {
        Self(Self::LENIENT)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether a pair with this score is a duplicate candidate
    pub fn is_duplicate(&self, mismatch_percentage: f64) -> bool {
        mismatch_percentage < self.0
    }

    pub fn description(&self) -> String {
        format!(
            "Pairs with less than {}% mismatching pixels are reported as duplicates",
            self.0
        )
    }
}

impl Default for MismatchThreshold {
    fn default() -> Self {
        Self::strict()
    }
}

impl FromStr for MismatchThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => return Ok(Self::strict()),
            "lenient" => return Ok(Self::lenient()),
            _ => {}
        }

        let value: f64 = s
            .trim()
            .trim_end_matches('%')
            .parse()
            .map_err(|_| format!("'{}' is not a percentage", s))?;

        Self::new(value).map_err(|e| e.to_string())
    }
}

impl std::fmt::Display for MismatchThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strictly_below() {
        let threshold = MismatchThreshold::new(50.0).unwrap();

        assert!(threshold.is_duplicate(0.0));
        assert!(threshold.is_duplicate(49.99));
        assert!(!threshold.is_duplicate(50.0));
        assert!(!threshold.is_duplicate(73.2));
    }

    #[test]
    fn presets() {
        assert_eq!(MismatchThreshold::strict().value(), 20.0);
        assert_eq!(MismatchThreshold::lenient().value(), 50.0);
        assert_eq!(MismatchThreshold::default(), MismatchThreshold::strict());
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(MismatchThreshold::new(-1.0).is_err());
        assert!(MismatchThreshold::new(100.5).is_err());
        assert!(MismatchThreshold::new(f64::NAN).is_err());
        assert!(MismatchThreshold::new(100.0).is_ok());
    }

    #[test]
    fn parses_numbers_and_presets() {
        assert_eq!("35".parse::<MismatchThreshold>().unwrap().value(), 35.0);
        assert_eq!("12.5%".parse::<MismatchThreshold>().unwrap().value(), 12.5);
        assert_eq!("lenient".parse::<MismatchThreshold>().unwrap().value(), 50.0);
        assert!("abc".parse::<MismatchThreshold>().is_err());
        assert!("250".parse::<MismatchThreshold>().is_err());
    }

    #[test]
    fn description_includes_value() {
        assert!(MismatchThreshold::new(33.0).unwrap().description().contains("33"));
    }
}
