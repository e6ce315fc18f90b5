//! # Decode Module
//!
//! Turns image files into pixels for the thumbnail and comparison phases.
//!
//! JPEGs go through zune-jpeg (1.5-2x faster than the image crate); every
//! other format, and any JPEG zune-jpeg rejects, goes through the image
//! crate.

use crate::core::hasher::read_file_bytes;
use crate::error::FileAccessError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use std::path::Path;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

/// Decode an image file.
pub fn decode_image(path: &Path) -> Result<DynamicImage, FileAccessError> {
    if is_jpeg(path) {
        decode_jpeg(path).or_else(|_| decode_fallback(path))
    } else {
        decode_fallback(path)
    }
}

fn is_jpeg(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref(),
        Some("jpg" | "jpeg")
    )
}

fn decode_jpeg(path: &Path) -> Result<DynamicImage, FileAccessError> {
    let file_bytes = read_file_bytes(path)?;
    let decode_error = |reason: String| FileAccessError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let options = DecoderOptions::new_fast().jpeg_set_out_colorspace(ColorSpace::RGB);
    let mut decoder = JpegDecoder::new_with_options(&file_bytes[..], options);

    let pixels = decoder
        .decode()
        .map_err(|e| decode_error(format!("zune-jpeg decode failed: {:?}", e)))?;

    let info = decoder
        .info()
        .ok_or_else(|| decode_error("missing image info".to_string()))?;
    let (width, height) = (info.width as u32, info.height as u32);

    let image = match decoder.get_output_colorspace().unwrap_or(ColorSpace::RGB) {
        ColorSpace::RGB => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8),
        ColorSpace::RGBA => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgba8),
        ColorSpace::Luma => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8),
        other => {
            return Err(decode_error(format!("unsupported colorspace {:?}", other)));
        }
    };

    image.ok_or_else(|| decode_error("pixel buffer does not match dimensions".to_string()))
}

fn decode_fallback(path: &Path) -> Result<DynamicImage, FileAccessError> {
    let bytes = read_file_bytes(path)?;
    image::load_from_memory(&bytes).map_err(|e| FileAccessError::Decode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
