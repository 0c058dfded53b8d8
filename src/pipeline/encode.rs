//! Image encoding: screenshot file → base64 `ImageData` for chat-style VLMs.
//!
//! Providers reached through `edgequake-llm` take images inline as base64
//! data rather than as uploaded file handles. The bytes are sent as-is:
//! screenshots are already PNG, and re-encoding would only cost time.
//! `detail: "high"` keeps OpenAI-style tiling from downsampling the small
//! table text.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// MIME type for a screenshot path, from its extension. Defaults to PNG.
pub fn mime_type_for(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
}

/// Wrap raw screenshot bytes as a base64 image attachment.
pub fn encode_image(bytes: &[u8], mime_type: &str) -> ImageData {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, mime_type).with_detail("high")
}

/// Read and encode a screenshot from disk.
pub async fn encode_file(path: &Path) -> std::io::Result<ImageData> {
    let bytes = tokio::fs::read(path).await?;
    Ok(encode_image(&bytes, mime_type_for(path)))
}
