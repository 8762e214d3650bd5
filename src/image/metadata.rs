//! Byte-level access to the codec dimension records.
//!
//! PNG keeps bit depth and pixel dimensions in the IHDR chunk (`width`,
//! `height`, `bitDepth`); baseline JPEG keeps them in the SOF segment
//! (`samplesPerLine`, `numLines`, `samplePrecision`). When an image
//! crosses the format boundary, the freshly encoded JPEG carries whatever
//! the encoder produced, so the values read from the source are written
//! back over the SOF fields before the file is finalized.

use super::ImageFormat;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// The three structural fields that differ between codec containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub bit_depth: u8,
    pub width: u32,
    pub height: u32,
}

impl ImageMetadata {
    /// Read the dimension record from encoded image bytes.
    ///
    /// Returns `None` when the bytes do not carry a recognizable container
    /// for `format`; callers treat that as "skip metadata propagation".
    pub fn extract(bytes: &[u8], format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Self::from_png(bytes),
            ImageFormat::Jpg => Self::from_jpeg(bytes),
        }
    }

    /// IHDR is required to be the first chunk, directly after the 8-byte
    /// signature: 4-byte length, 4-byte type, then width/height/bit depth.
    fn from_png(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 25 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
            return None;
        }
        Some(Self {
            width: u32::from_be_bytes(bytes[16..20].try_into().ok()?),
            height: u32::from_be_bytes(bytes[20..24].try_into().ok()?),
            bit_depth: bytes[24],
        })
    }

    fn from_jpeg(bytes: &[u8]) -> Option<Self> {
        let sof = find_sof_payload(bytes)?;
        if bytes.len() < sof + 5 {
            return None;
        }
        Some(Self {
            bit_depth: bytes[sof],
            height: u32::from(u16::from_be_bytes([bytes[sof + 1], bytes[sof + 2]])),
            width: u32::from(u16::from_be_bytes([bytes[sof + 3], bytes[sof + 4]])),
        })
    }

    /// Overwrite the SOF precision/lines/samples fields of an encoded JPEG
    /// with this record. Returns false if no SOF segment was found or the
    /// record does not fit the 16-bit SOF fields.
    pub fn apply_to_jpeg(&self, bytes: &mut [u8]) -> bool {
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            tracing::debug!(
                "{}x{} exceeds the SOF field range, keeping the encoded values",
                self.width,
                self.height
            );
            return false;
        }
        let Some(sof) = find_sof_payload(bytes) else {
            return false;
        };
        if bytes.len() < sof + 5 {
            return false;
        }
        bytes[sof] = self.bit_depth;
        bytes[sof + 1..sof + 3].copy_from_slice(&(self.height as u16).to_be_bytes());
        bytes[sof + 3..sof + 5].copy_from_slice(&(self.width as u16).to_be_bytes());
        true
    }
}

/// Offset of the first SOF segment's payload (the byte after the marker
/// and length), or `None` if the stream has no frame header before SOS.
fn find_sof_payload(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        // Fill bytes before a marker are legal.
        let mut marker_pos = pos + 1;
        while marker_pos < bytes.len() && bytes[marker_pos] == 0xFF {
            marker_pos += 1;
        }
        let marker = *bytes.get(marker_pos)?;
        match marker {
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => {
                pos = marker_pos + 1;
                continue;
            }
            // Scan data follows SOS; no frame header was seen.
            0xDA => return None,
            // SOF0-SOF15, minus DHT (C4), JPG (C8) and DAC (CC).
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                return Some(marker_pos + 3);
            }
            _ => {
                let length =
                    u16::from_be_bytes([*bytes.get(marker_pos + 1)?, *bytes.get(marker_pos + 2)?]);
                pos = marker_pos + 1 + usize::from(length);
            }
        }
    }
    None
}
