use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ExtendedColorType, RgbaImage, codecs::jpeg::JpegEncoder};

use crate::types::Frame;

/// Encode a captured frame as JPEG for upload. JPEG has no alpha channel, so
/// the frame is flattened to RGB first.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone()).ok_or_else(|| {
        anyhow!(
            "frame buffer too small for {}x{}: got {} bytes",
            frame.width,
            frame.height,
            frame.rgba.len()
        )
    })?;
    let rgb = DynamicImage::ImageRgba8(rgba).into_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode(rgb.as_raw(), frame.width, frame.height, ExtendedColorType::Rgb8)
        .context("failed to encode frame as JPEG")?;
    Ok(jpeg)
}
