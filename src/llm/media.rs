use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageFormat};

use crate::error::StylistError;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// An image carried inline in a model request.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl InlineImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
        InlineImage { bytes, mime_type }
    }

    /// Encodes as PNG so isolated garments keep their transparency.
    pub fn from_image(image: &DynamicImage) -> Result<Self, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(InlineImage {
            bytes: buffer.into_inner(),
            mime_type: "image/png".to_string(),
        })
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Drops a `data:<mime>;base64,` style prefix when present.
pub fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

pub fn decode_image_payload(payload: &str) -> Result<InlineImage, StylistError> {
    let data = strip_data_url_prefix(payload.trim());
    let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(StylistError::InvalidImage("empty image payload".to_string()));
    }

    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|err| StylistError::InvalidImage(format!("base64 decode failed: {err}")))?;
    image::guess_format(&bytes)
        .map_err(|err| StylistError::InvalidImage(format!("unrecognized image data: {err}")))?;

    Ok(InlineImage::from_bytes(bytes))
}
