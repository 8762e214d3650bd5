//! Image formats, save modes, and the PNG -> JPEG transcoder.
//!
//! The catalogs serve a mix of PNG and JPEG captures. Images are either
//! stored byte-for-byte as fetched, or re-encoded as JPEG at a configured
//! quality. Re-encoding goes through [`metadata`] to carry the source
//! codec's dimension record (bit depth, width, height) into the encoded
//! output, which the default encoder does not do on its own.

pub mod metadata;

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;

use crate::error::{HarvestError, Result};

use metadata::ImageMetadata;

/// The two raster formats the catalogs serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
}

impl ImageFormat {
    /// File extension, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => ".png",
            ImageFormat::Jpg => ".jpg",
        }
    }

    /// Determine the format from a URL's file extension, case-insensitive.
    pub fn from_url(url: &str) -> Option<Self> {
        let ext = url.rsplit('.').next()?;
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpg),
            _ => None,
        }
    }

    fn codec(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
        }
    }
}

/// Policy for how fetched images are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Keep the fetched bytes in their original format.
    AsIs,
    /// Re-encode as JPEG; a no-op passthrough for images already in JPEG.
    ConvertToJpg,
}

impl SaveMode {
    /// The format an image in `source` format ends up in under this mode.
    pub fn target_format(&self, source: ImageFormat) -> ImageFormat {
        match self {
            SaveMode::AsIs => source,
            SaveMode::ConvertToJpg => ImageFormat::Jpg,
        }
    }

    /// Write fetched image bytes to `dest` according to this mode.
    ///
    /// `quality` is the JPEG compression quality in [0.0, 1.0]; it is only
    /// used when an actual re-encode happens.
    pub fn save_image(
        &self,
        bytes: &[u8],
        source: ImageFormat,
        dest: &Path,
        quality: f32,
    ) -> Result<()> {
        if self.target_format(source) == source {
            // Already in the target format: byte-identical copy, no
            // needless re-encode.
            fs::write(dest, bytes)?;
            Ok(())
        } else {
            transcode_to_jpeg(bytes, source, dest, quality)
        }
    }
}

/// Decode `bytes`, re-encode as JPEG at `quality`, and write to `dest`,
/// carrying the source's dimension record into the output.
fn transcode_to_jpeg(bytes: &[u8], source: ImageFormat, dest: &Path, quality: f32) -> Result<()> {
    let decoded = image::load_from_memory_with_format(bytes, source.codec()).map_err(|e| {
        HarvestError::Image {
            path: dest.to_path_buf(),
            source: e,
        }
    })?;

    // Best-effort: an unrecognized source container just means the encoded
    // output keeps the encoder's own dimension record.
    let source_metadata = ImageMetadata::extract(bytes, source);

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut encoded), quality_ratio(quality));
    decoded
        .write_with_encoder(encoder)
        .map_err(|e| HarvestError::Image {
            path: dest.to_path_buf(),
            source: e,
        })?;

    if let Some(meta) = source_metadata {
        meta.apply_to_jpeg(&mut encoded);
    }

    fs::write(dest, encoded)?;
    Ok(())
}

/// Map a [0.0, 1.0] quality to the encoder's 1-100 scale.
fn quality_ratio(quality: f32) -> u8 {
    (quality * 100.0).clamp(1.0, 100.0) as u8
}
