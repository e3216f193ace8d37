// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Image intake: the "before" and "after" upload slots

use base64::{engine::general_purpose, Engine as _};
use image::GenericImageView;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::{FrameShiftError, Result};

/// Which of the two images a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Before,
    After,
}

impl Slot {
    pub const BOTH: [Slot; 2] = [Slot::Before, Slot::After];

    /// Multipart field name expected by the analysis endpoint
    pub fn field_name(self) -> &'static str {
        match self {
            Slot::Before => "image1",
            Slot::After => "image2",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Slot::Before => "Image 1 (Before)",
            Slot::After => "Image 2 (After)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Before => "before",
            Slot::After => "after",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Slot {
    type Err = FrameShiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "first" | "before" | "image1" => Ok(Slot::Before),
            "2" | "second" | "after" | "image2" => Ok(Slot::After),
            other => Err(FrameShiftError::Validation(format!("Unknown image slot: {}", other))),
        }
    }
}

/// A decoded upload held in memory until submission
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// PNG thumbnail as a `data:` URI
    pub preview: String,
}

impl UploadedImage {
    /// Decode `bytes` and build a preview no larger than `max_preview`
    /// pixels on its longest side. Blocking; see [`select_image`].
    pub fn decode(file_name: impl Into<String>, bytes: Vec<u8>, max_preview: u32) -> Result<Self> {
        let file_name = file_name.into();
        let format = image::guess_format(&bytes)?;
        let img = image::load_from_memory_with_format(&bytes, format)?;
        let (width, height) = img.dimensions();

        let thumb = if width > max_preview || height > max_preview {
            img.thumbnail(max_preview, max_preview)
        } else {
            img
        };

        // PNG has no float pixel formats; HDR/EXR uploads are previewed as 8-bit.
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        image::DynamicImage::ImageRgba8(thumb.to_rgba8())
            .write_to(&mut cursor, image::ImageFormat::Png)?;

        debug!("Decoded {} as {:?} ({}x{})", file_name, format, width, height);

        Ok(Self {
            file_name,
            mime_type: format.to_mime_type(),
            bytes,
            width,
            height,
            preview: format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&buffer)),
        })
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

/// State of one upload slot
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SlotState {
    #[default]
    Empty,
    Ready(UploadedImage),
    DecodeFailed { file_name: String, reason: String },
}

impl SlotState {
    pub fn image(&self) -> Option<&UploadedImage> {
        match self {
            SlotState::Ready(img) => Some(img),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SlotState::Ready(_))
    }
}

/// Decode raw bytes for a slot off the async executor.
pub async fn decode_upload(
    slot: Slot,
    file_name: String,
    bytes: Vec<u8>,
    max_preview: u32,
) -> Result<UploadedImage> {
    let name = file_name.clone();
    let decoded = tokio::task::spawn_blocking(move || UploadedImage::decode(name, bytes, max_preview))
        .await
        .map_err(|e| FrameShiftError::Task(format!("image decode: {}", e)))?;

    match &decoded {
        Ok(img) => info!("Loaded {} image {} ({}x{})", slot, img.file_name, img.width, img.height),
        Err(e) => warn!("Could not decode {} image {}: {}", slot, file_name, e),
    }
    decoded
}

/// Read a file from disk into a slot.
pub async fn select_image(slot: Slot, path: &Path, max_preview: u32) -> Result<UploadedImage> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| slot.field_name().to_string());
    decode_upload(slot, file_name, bytes, max_preview).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Encode a small solid PNG
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_slot_parsing() {
        assert_eq!("1".parse::<Slot>().unwrap(), Slot::Before);
        assert_eq!("After".parse::<Slot>().unwrap(), Slot::After);
        assert_eq!("image2".parse::<Slot>().unwrap(), Slot::After);
        assert!("third".parse::<Slot>().is_err());
        assert_eq!(Slot::Before.field_name(), "image1");
    }

    #[test]
    fn test_decode_builds_bounded_preview() {
        let img = UploadedImage::decode("big.png", png_bytes(600, 300), 64).unwrap();
        assert_eq!((img.width, img.height), (600, 300));
        assert_eq!(img.mime_type, "image/png");
        assert!(img.preview.starts_with("data:image/png;base64,"));

        let payload = img.preview.trim_start_matches("data:image/png;base64,");
        let thumb = image::load_from_memory(&general_purpose::STANDARD.decode(payload).unwrap()).unwrap();
        assert!(thumb.width() <= 64 && thumb.height() <= 64);
    }

    #[test]
    fn test_decode_float_image_gets_preview() {
        let img = image::Rgb32FImage::from_pixel(8, 8, image::Rgb([0.25, 1.5, 0.0]));
        let mut exr = Vec::new();
        image::DynamicImage::ImageRgb32F(img)
            .write_to(&mut std::io::Cursor::new(&mut exr), image::ImageFormat::OpenExr)
            .unwrap();

        let uploaded = UploadedImage::decode("scene.exr", exr, 256).unwrap();
        assert_eq!((uploaded.width, uploaded.height), (8, 8));
        assert!(uploaded.preview.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_decode_rejects_non_images() {
        let err = UploadedImage::decode("notes.txt", b"hello world".to_vec(), 64).unwrap_err();
        assert!(matches!(err, FrameShiftError::ImageDecode(_)));
    }

    #[tokio::test]
    async fn test_select_image_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(&png_bytes(8, 8)).unwrap();

        let img = select_image(Slot::After, file.path(), 256).await.unwrap();
        assert_eq!(img.width, 8);
        assert!(img.file_name.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_select_missing_file() {
        let err = select_image(Slot::Before, Path::new("/nonexistent/before.png"), 256)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameShiftError::FileSystem(_)));
    }
}
