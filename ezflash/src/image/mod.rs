//! Firmware image formats.
//!
//! Both supported text formats produce a [`SegmentMap`], the in-memory
//! description of what to write to (or compare against) the target.

pub mod ihex;
pub mod segments;
pub mod titxt;

use {
    crate::error::{Error, Result},
    log::debug,
    std::{fs, path::Path},
};

pub use segments::{DEFAULT_FILL, MAX_FLAT_IMAGE_LEN, SegmentMap};
pub use titxt::DEFAULT_CHUNK_SIZE;

/// Supported image file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Intel HEX records (`.a43`, `.hex`, `.ihex`).
    IntelHex,
    /// TI-TXT (`.txt`).
    TiTxt,
}

impl ImageFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "a43" | "hex" | "ihex" => Ok(Self::IntelHex),
            "txt" => Ok(Self::TiTxt),
            _ => Err(Error::UnsupportedImage(format!(
                "{} (expected .a43, .hex or .txt)",
                path.display()
            ))),
        }
    }

    /// Parse image text in this format.
    ///
    /// `chunk_size` only applies to TI-TXT images.
    pub fn parse(self, text: &str, chunk_size: usize) -> Result<SegmentMap> {
        match self {
            Self::IntelHex => ihex::parse(text),
            Self::TiTxt => titxt::parse(text, chunk_size),
        }
    }
}

/// Load an image file, choosing the parser by its extension.
pub fn load_image<P: AsRef<Path>>(path: P, chunk_size: usize) -> Result<SegmentMap> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    debug!("Loading {format:?} image from: {}", path.display());

    let text = fs::read_to_string(path)?;
    format.parse(&text, chunk_size)
}
