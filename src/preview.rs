use std::io::Cursor;

use base64::Engine;
use image::{ImageFormat, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("could not decode image: {0}")] Decode(String),
    #[error("could not encode preview: {0}")] Encode(String),
}

/// Re-encodes an uploaded design as a PNG data URI at the image's native size.
///
/// The image is drawn onto a fully transparent RGBA canvas, so formats without an alpha
/// channel come out opaque and PNGs keep their transparency.
pub fn create_transparent_preview(bytes: &[u8]) -> Result<String, PreviewError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| PreviewError::Decode(e.to_string()))?;
    let source = decoded.to_rgba8();

    let mut canvas = RgbaImage::new(source.width(), source.height());
    image::imageops::overlay(&mut canvas, &source, 0, 0);

    let mut png = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PreviewError::Encode(e.to_string()))?;

    Ok(format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(png)))
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, _| {
        if x % 2 == 0 { image::Rgba([255, 0, 0, 255]) } else { image::Rgba([0, 0, 0, 0]) }
    });
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
    out
}
