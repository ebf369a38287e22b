//! Validation and decoding of submitted images

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

const DEFAULT_MIME_TYPE: &str = "image/jpeg";
const SUPPORTED_SUBTYPES: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];
const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("Image is required")]
    Missing,

    #[error("Image too large. Size: {:.2}MB, Maximum: {:.0}MB", mib(.size_bytes), mib(.max_bytes))]
    TooLarge { size_bytes: usize, max_bytes: usize },

    #[error("Invalid image format. Supported formats: JPEG, PNG, GIF, WebP")]
    InvalidFormat,
}

fn mib(bytes: &usize) -> f64 {
    *bytes as f64 / MIB
}

/// A decoded image ready for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Decoded size implied by a base64 image or data URL
pub fn estimated_size(image: &str) -> usize {
    let encoded = image.split_once(',').map_or(image, |(_, data)| data);
    encoded.len() * 3 / 4
}

/// Validate a base64 image (optionally a `data:image/...;base64,` URL) and
/// decode it. Size is checked before format, so oversized uploads are
/// rejected without decoding.
pub fn decode_image(image: &str, max_bytes: usize) -> Result<ImagePayload, ImageError> {
    if image.is_empty() {
        return Err(ImageError::Missing);
    }

    let size_bytes = estimated_size(image);
    if size_bytes > max_bytes {
        return Err(ImageError::TooLarge { size_bytes, max_bytes });
    }

    let (mime_type, encoded) = match image.strip_prefix("data:") {
        Some(rest) => {
            let (mime_type, encoded) = rest.split_once(";base64,").ok_or(ImageError::InvalidFormat)?;
            (normalize_mime(mime_type)?, encoded)
        }
        None => (DEFAULT_MIME_TYPE.to_string(), image),
    };

    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|_| ImageError::InvalidFormat)?;

    Ok(ImagePayload { mime_type, data })
}

fn normalize_mime(mime_type: &str) -> Result<String, ImageError> {
    let subtype = mime_type
        .strip_prefix("image/")
        .filter(|subtype| SUPPORTED_SUBTYPES.contains(subtype))
        .ok_or(ImageError::InvalidFormat)?;

    if subtype == "jpg" {
        Ok(DEFAULT_MIME_TYPE.to_string())
    } else {
        Ok(mime_type.to_string())
    }
}
