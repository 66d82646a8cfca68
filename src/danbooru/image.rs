use std::fs::{File, create_dir_all};
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use thiserror::Error;

/// JPEG quality for cached artist images. High, to keep them useful as
/// reference material.
pub(crate) const CACHE_JPEG_QUALITY: u8 = 95;

/// JPEG quality for compressed gallery images.
pub(crate) const GALLERY_JPEG_QUALITY: u8 = 85;

/// Maximum width of a compressed gallery image.
pub(crate) const GALLERY_MAX_WIDTH: u32 = 1280;

/// Errors raised while decoding or re-encoding images.
#[derive(Debug, Error)]
pub(crate) enum ImageError {
    #[error("unable to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("unable to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingests a user-supplied image into the cache: decode, flatten alpha and
/// palette modes down to RGB, re-encode as high-quality JPEG at `target`.
pub(crate) fn ingest(source: &Path, target: &Path) -> Result<(), ImageError> {
    let decoded = image::open(source).map_err(ImageError::Decode)?;
    encode_jpeg(&decoded.to_rgb8(), target, CACHE_JPEG_QUALITY)
}

/// Compresses a gallery image to `target`: RGB flatten, downscale to at most
/// [`GALLERY_MAX_WIDTH`] pixels wide, re-encode at gallery quality.
pub(crate) fn compress(source: &Path, target: &Path) -> Result<(), ImageError> {
    let decoded = image::open(source).map_err(ImageError::Decode)?;
    let mut flattened = DynamicImage::ImageRgb8(decoded.to_rgb8());

    if flattened.width() > GALLERY_MAX_WIDTH {
        let scaled_height = (flattened.height() as u64 * GALLERY_MAX_WIDTH as u64
            / flattened.width() as u64) as u32;
        flattened = flattened.resize(
            GALLERY_MAX_WIDTH,
            scaled_height.max(1),
            FilterType::Lanczos3,
        );
    }

    encode_jpeg(&flattened.to_rgb8(), target, GALLERY_JPEG_QUALITY)
}

/// Structurally verifies an image file. Used after downloads to reject HTML
/// served as an image or truncated streams; any failure counts as invalid.
pub(crate) fn verify_integrity(path: &Path) -> bool {
    image::open(path).is_ok()
}

fn encode_jpeg(pixels: &RgbImage, target: &Path, quality: u8) -> Result<(), ImageError> {
    if let Some(parent) = target.parent() {
        create_dir_all(parent)?;
    }

    let mut out = BufWriter::new(File::create(target)?);
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(pixels)
        .map_err(ImageError::Encode)?;
    out.flush()?;
    Ok(())
}
