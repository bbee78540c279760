//! JPEG frame decode/encode.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::error::PipelineError;

/// Default output quality; frames are small and latency matters more.
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// Decodes any supported encoded image into RGB.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    let image = image::load_from_memory(bytes).map_err(PipelineError::Decode)?;
    Ok(image.to_rgb8())
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    image.write_with_encoder(encoder).map_err(PipelineError::Encode)?;
    Ok(out)
}

/// Sniffs whether `bytes` look like a JPEG.
pub fn is_jpeg(bytes: &[u8]) -> bool {
    matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg))
}

/// Re-encodes PNG or other formats as JPEG, passing JPEG through untouched.
pub fn ensure_jpeg(bytes: Vec<u8>, quality: u8) -> Result<Vec<u8>, PipelineError> {
    if is_jpeg(&bytes) {
        return Ok(bytes);
    }
    let image = image::load(Cursor::new(&bytes), image::guess_format(&bytes).map_err(PipelineError::Decode)?)
        .map_err(PipelineError::Decode)?;
    encode_jpeg(&image.to_rgb8(), quality)
}
