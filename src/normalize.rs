//! Request normalization: notes validation, image decoding and mode
//! selection. Runs entirely before the engine is contacted.

use std::io::Cursor;

use base64::Engine as _;
use image::io::Reader as ImageReader;
use image::RgbImage;
use serde::Serialize;

use crate::error::AnalyzeError;
use crate::AnalyzeRequest;

/// Marker separating a data-URL prefix from its payload.
const BASE64_MARKER: &str = "base64,";

/// Largest raster accepted by default, in pixels. Headers claiming more are
/// rejected before any pixel buffer is allocated.
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 89_478_485;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Full,
    TextOnly,
}

impl Mode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "full" => Some(Mode::Full),
            "text-only" => Some(Mode::TextOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::TextOnly => "text-only",
        }
    }
}

/// Validated input handed to the engine.
#[derive(Debug, Clone)]
pub struct ClinicalRequest {
    /// Trimmed, never empty.
    pub notes: String,
    pub image: Option<RgbImage>,
    pub mode: Mode,
}

impl ClinicalRequest {
    pub fn image_analyzed(&self) -> bool {
        self.image.is_some()
    }
}

/// Turn the wire payload into a [`ClinicalRequest`]. Notes are checked
/// first so an empty request never pays for image decoding.
///
/// Image decoding is CPU bound; async callers should run this on the
/// blocking pool.
pub fn normalize(
    payload: &AnalyzeRequest,
    max_image_pixels: u64,
) -> Result<ClinicalRequest, AnalyzeError> {
    let notes = payload
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AnalyzeError::Validation("Clinical notes are required".into()))?
        .to_string();

    let explicit_mode = match payload.mode.as_deref() {
        Some(raw) => Some(Mode::parse(raw).ok_or_else(|| {
            AnalyzeError::Validation("mode must be 'full' or 'text-only'".into())
        })?),
        None => None,
    };

    let image = match payload.image.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => {
            let img = decode_image(raw, max_image_pixels)?;
            tracing::info!(width = img.width(), height = img.height(), "image received");
            Some(img)
        }
        None => None,
    };

    let mode = explicit_mode.unwrap_or(if image.is_some() {
        Mode::Full
    } else {
        Mode::TextOnly
    });

    Ok(ClinicalRequest { notes, image, mode })
}

/// Strip an optional data-URL prefix and return the base64 payload.
pub fn strip_data_url(raw: &str) -> &str {
    match raw.find(BASE64_MARKER) {
        Some(idx) => &raw[idx + BASE64_MARKER.len()..],
        None => raw,
    }
}

/// Decode a base64 (or data-URL) image into an RGB raster. Whitespace
/// inside the payload (line-wrapped base64) is ignored. Images whose header
/// declares more than `max_pixels` pixels are refused without decoding.
pub fn decode_image(raw: &str, max_pixels: u64) -> Result<RgbImage, AnalyzeError> {
    let payload: String = strip_data_url(raw)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| AnalyzeError::ImageDecode(format!("base64 decode failed: {e}")))?;

    let (width, height) = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| AnalyzeError::ImageDecode(format!("image header unreadable: {e}")))?
        .into_dimensions()
        .map_err(|e| AnalyzeError::ImageDecode(format!("image header unreadable: {e}")))?;
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(AnalyzeError::ImageDecode(format!(
            "image of {width}x{height} exceeds {max_pixels} pixels"
        )));
    }

    let img = image::load_from_memory(&bytes)
        .map_err(|e| AnalyzeError::ImageDecode(format!("image decode failed: {e}")))?;
    Ok(img.to_rgb8())
}
