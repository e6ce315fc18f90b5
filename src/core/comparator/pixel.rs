//! Pixel-level mismatch comparator.

use super::ImageComparator;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};

/// Channel delta above which two pixels count as different
pub const DEFAULT_TOLERANCE: u8 = 16;

/// Compares images pixel by pixel after scaling them to the same size.
///
/// Both images are brought down to the smaller common width and height,
/// then every pixel whose red, green, blue or alpha channel differs by more
/// than the tolerance counts as a mismatch. The score is the share of
/// mismatching pixels, rounded to two decimals.
#[derive(Debug, Clone)]
pub struct PixelComparator {
    tolerance: u8,
}

impl PixelComparator {
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(tolerance: u8) -> Self {
        Self { tolerance }
    }

    fn to_common_size(image: &DynamicImage, width: u32, height: u32) -> RgbaImage {
        if image.dimensions() == (width, height) {
            image.to_rgba8()
        } else {
            image
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgba8()
        }
    }
}

impl Default for PixelComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageComparator for PixelComparator {
    fn compare(&self, first: &DynamicImage, second: &DynamicImage) -> f64 {
        let width = first.width().min(second.width());
        let height = first.height().min(second.height());

        if width == 0 || height == 0 {
            let is_empty = |image: &DynamicImage| image.width() == 0 || image.height() == 0;
            let both_empty = is_empty(first) && is_empty(second);
            return if both_empty { 0.0 } else { 100.0 };
        }

        let a = Self::to_common_size(first, width, height);
        let b = Self::to_common_size(second, width, height);

        let mismatched = a
            .pixels()
            .zip(b.pixels())
            .filter(|(pa, pb)| {
                pa.0.iter()
                    .zip(pb.0.iter())
                    .any(|(ca, cb)| ca.abs_diff(*cb) > self.tolerance)
            })
            .count();

        let total = (width as u64 * height as u64) as f64;
        let percentage = mismatched as f64 * 100.0 / total;
        ((percentage * 100.0).round() / 100.0).clamp(0.0, 100.0)
    }

    fn name(&self) -> &'static str {
        "pixel"
    }
}
