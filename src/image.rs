//! Image format detection from leading magic bytes.

use log::{debug, trace};
use std::fmt;

/// Formats the contact photo endpoint knows how to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Classify `bytes` by signature. Anything unrecognised, including inputs
    /// shorter than two bytes, is reported as JPEG.
    pub fn detect(bytes: &[u8]) -> Self {
        trace!("Image signature: {:02X?}", &bytes[..bytes.len().min(4)]);
        let format = match bytes {
            [0xFF, 0xD8, ..] => ImageFormat::Jpeg,
            [0x89, 0x50, 0x4E, 0x47, ..] => ImageFormat::Png,
            [0x47, 0x49, 0x46, ..] => ImageFormat::Gif,
            _ => ImageFormat::Jpeg,
        };
        debug!("Detected {format} for {} byte image", bytes.len());
        format
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
        };
        f.write_str(name)
    }
}
