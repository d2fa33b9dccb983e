// QR image rendering for the QR payload JoFotara returns

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::Luma;
use qrcode::QrCode;
use thiserror::Error;

const DATA_URI_PREFIX: &str = "data:image/";
const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Rendered images are capped at this many pixels per side.
const MAX_DIMENSION: u32 = 512;

#[derive(Error, Debug)]
pub enum QrImageError {
    #[error("QR payload is empty")]
    Empty,

    #[error("Failed to generate QR code: {0}")]
    Encode(String),

    #[error("Failed to encode QR image: {0}")]
    Image(String),
}

/// Render `payload` into a PNG and return it as a `data:image/png;base64,` URI.
///
/// JoFotara sometimes answers with a ready-made image data URI; that is
/// returned as-is.
pub fn render_png_data_uri(payload: &str) -> Result<String, QrImageError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(QrImageError::Empty);
    }
    if payload.starts_with(DATA_URI_PREFIX) {
        return Ok(payload.to_string());
    }

    let code = QrCode::new(payload.as_bytes()).map_err(|e| QrImageError::Encode(e.to_string()))?;
    let image = code
        .render::<Luma<u8>>()
        .max_dimensions(MAX_DIMENSION, MAX_DIMENSION)
        .build();

    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(image)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| QrImageError::Image(e.to_string()))?;

    Ok(format!(
        "{}{}",
        PNG_DATA_URI_PREFIX,
        general_purpose::STANDARD.encode(buffer.into_inner())
    ))
}
