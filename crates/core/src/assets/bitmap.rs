use std::path::Path;

use crate::{RenderError, Result};

/// Row-major RGB8 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapAsset {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl BitmapAsset {
    /// Wraps a raw RGB8 buffer. The buffer must hold `width * height * 3` bytes.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(RenderError::msg(format!(
                "RGB buffer holds {} bytes, {width}x{height} needs {expected}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Single-colour bitmap, mostly useful for tests and placeholders.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Decodes any image format enabled on the `image` crate into RGB8. The
/// format is sniffed from the file contents, so mislabelled extensions still
/// load.
pub fn decode(path: &Path) -> Result<BitmapAsset> {
    let fail = |reason: String| RenderError::BitmapDecode {
        path: path.to_path_buf(),
        reason,
    };

    let image = image::ImageReader::open(path)
        .map_err(|err| fail(err.to_string()))?
        .with_guessed_format()
        .map_err(|err| fail(err.to_string()))?
        .decode()
        .map_err(|err| fail(err.to_string()))?
        .into_rgb8();

    let (width, height) = image.dimensions();
    tracing::debug!(path = %path.display(), width, height, "decoded bitmap");
    BitmapAsset::from_rgb(width, height, image.into_raw())
}
