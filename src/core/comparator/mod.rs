//! # Comparator Module
//!
//! Scores how different two images look.
//!
//! The comparison algorithm sits behind the [`ImageComparator`] trait so
//! the engine only ever sees a mismatch percentage. [`PixelComparator`] is
//! the built-in implementation.
//!
//! ## Classification
//! | Mismatch  | Classification   |
//! |-----------|------------------|
//! | 0%        | Exact match      |
//! | < 5%      | Near-exact       |
//! | < 20%     | Similar          |
//! | otherwise | Possibly similar |

mod pixel;
mod traits;

pub use pixel::{PixelComparator, DEFAULT_TOLERANCE};
pub use traits::{ImageComparator, MismatchThreshold};

use serde::{Deserialize, Serialize};

/// Classification of a pair by its mismatch percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    /// 0%, identical content
    Exact,
    /// Below 5%, virtually identical
    NearExact,
    /// Below 20%, likely the same picture
    Similar,
    /// Anything else that still passed the configured threshold
    MaybeSimilar,
}

impl MatchType {
    pub fn from_mismatch(percentage: f64) -> Self {
        if percentage <= 0.0 {
            MatchType::Exact
        } else if percentage < 5.0 {
            MatchType::NearExact
        } else if percentage < 20.0 {
            MatchType::Similar
        } else {
            MatchType::MaybeSimilar
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Exact => write!(f, "Exact Match"),
            MatchType::NearExact => write!(f, "Near-Exact Match"),
            MatchType::Similar => write!(f, "Similar"),
            MatchType::MaybeSimilar => write!(f, "Possibly Similar"),
        }
    }
}
