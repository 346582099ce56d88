//! Image attachment codec
//!
//! Images travel as self-describing data URIs (`data:<mime>;base64,<payload>`).
//! Before long-term persistence they are re-encoded as JPEG; that step is
//! best-effort and hands back the input whenever the payload can't be decoded.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use std::io::Read;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{JournalError, JournalResult};
use crate::types::TradeImage;

/// Default JPEG quality factor
pub const DEFAULT_QUALITY: f32 = 0.7;

/// Largest accepted attachment (raw bytes)
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Attachments allowed per trade
pub const MAX_IMAGES_PER_TRADE: usize = 5;

/// Read `reader` to completion and wrap the payload in a data URI
pub fn encode<R: Read>(mut reader: R, mime_type: &str) -> JournalResult<String> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| JournalError::Decode(format!("failed to read image stream: {}", e)))?;
    Ok(encode_bytes(&bytes, mime_type))
}

pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Split a data URI into its MIME type and raw bytes
pub fn decode(encoded: &str) -> JournalResult<(String, Vec<u8>)> {
    let rest = encoded
        .strip_prefix("data:")
        .ok_or_else(|| JournalError::Decode("missing 'data:' prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| JournalError::Decode("missing payload separator".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| JournalError::Decode("only base64 payloads are supported".to_string()))?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| JournalError::Decode(e.to_string()))?;
    Ok((mime_type.to_string(), bytes))
}

/// MIME type from the payload's magic bytes
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

fn quality_to_u8(quality: f32) -> u8 {
    let q = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { DEFAULT_QUALITY };
    ((q * 100.0).round() as u8).max(1)
}

/// Re-encode an image data URI as JPEG at `quality` (0.0 - 1.0).
///
/// Pixel dimensions are preserved. Corrupt or unsupported payloads come back
/// unchanged.
pub fn compress(encoded: &str, quality: f32) -> String {
    match try_compress(encoded, quality) {
        Ok(compressed) => compressed,
        Err(e) => {
            debug!("Keeping image uncompressed: {}", e);
            encoded.to_string()
        }
    }
}

fn try_compress(encoded: &str, quality: f32) -> JournalResult<String> {
    let (_, bytes) = decode(encoded)?;
    let img = image::load_from_memory(&bytes).map_err(|e| JournalError::Decode(e.to_string()))?;

    // JPEG carries no alpha channel
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality_to_u8(quality));
    rgb.write_with_encoder(encoder)
        .map_err(|e| JournalError::Decode(e.to_string()))?;

    debug!(
        "Compressed {}x{} image: {} -> {} bytes",
        rgb.width(),
        rgb.height(),
        bytes.len(),
        out.len()
    );
    Ok(encode_bytes(&out, "image/jpeg"))
}

/// Compression settings applied on save
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    pub quality: f32,
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ImageCodec {
    pub fn new(quality: f32) -> Self {
        Self { quality }
    }

    pub fn compress(&self, encoded: &str) -> String {
        compress(encoded, self.quality)
    }

    /// Copy of `image` with its payload compressed
    pub fn compress_image(&self, image: &TradeImage) -> TradeImage {
        TradeImage {
            encoded_data: self.compress(&image.encoded_data),
            ..image.clone()
        }
    }
}

impl TradeImage {
    /// Build an attachment from raw bytes.
    ///
    /// Rejects non-image MIME types and payloads over [`MAX_IMAGE_BYTES`].
    pub fn from_bytes(name: impl Into<String>, mime_type: &str, bytes: &[u8]) -> JournalResult<Self> {
        Self::from_bytes_with_limit(name, mime_type, bytes, MAX_IMAGE_BYTES)
    }

    /// Like [`TradeImage::from_bytes`] with a caller-chosen size ceiling
    pub fn from_bytes_with_limit(
        name: impl Into<String>,
        mime_type: &str,
        bytes: &[u8],
        max_bytes: u64,
    ) -> JournalResult<Self> {
        if !mime_type.starts_with("image/") {
            return Err(JournalError::Decode(format!(
                "only image files are allowed, got '{}'",
                mime_type
            )));
        }

        let byte_size = bytes.len() as u64;
        if byte_size > max_bytes {
            warn!("Rejected image of {} bytes", byte_size);
            return Err(JournalError::Decode(format!(
                "image size {} exceeds limit of {} bytes",
                byte_size, max_bytes
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            encoded_data: encode_bytes(bytes, mime_type),
            name: name.into(),
            mime_type: mime_type.to_string(),
            byte_size,
            created_at: Utc::now().timestamp_millis(),
        })
    }

    pub fn from_reader<R: Read>(name: impl Into<String>, mime_type: &str, mut reader: R) -> JournalResult<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| JournalError::Decode(format!("failed to read image stream: {}", e)))?;
        Self::from_bytes(name, mime_type, &bytes)
    }
}
