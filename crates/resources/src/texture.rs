//! CPU-side texture data.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Side length of the generated fallback texture.
pub const CHECKERBOARD_SIZE: u32 = 256;

/// Cells per side of the fallback texture.
pub const CHECKERBOARD_CELLS: u32 = 8;

const CHECKER_DARK: u8 = 0x55;
const CHECKER_LIGHT: u8 = 0x6c;

/// Decoded RGBA8 pixels, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Wrap raw RGBA8 pixels.
    ///
    /// # Errors
    /// Returns [`ResourceError::InvalidDimensions`] for an empty size or a pixel
    /// buffer whose length is not `width * height * 4`.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> ResourceResult<Self> {
        if width == 0 || height == 0 {
            return Err(ResourceError::InvalidDimensions {
                width,
                height,
                message: "texture has no pixels".to_string(),
            });
        }

        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(ResourceError::InvalidDimensions {
                width,
                height,
                message: format!("expected {expected} bytes of RGBA8, got {}", pixels.len()),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Load an image file and convert it to RGBA8.
    ///
    /// Any format the `image` crate was built with is accepted.
    ///
    /// # Errors
    /// Returns [`ResourceError::FileNotFound`] if the path does not exist, or
    /// [`ResourceError::Image`] if decoding fails.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Loaded texture {} ({}x{})", path.display(), width, height);
        Self::from_rgba8(width, height, rgba.into_raw())
    }

    /// The 256x256 grey checkerboard used when an object has no texture.
    pub fn checkerboard() -> Self {
        let size = CHECKERBOARD_SIZE;
        let cell = size / CHECKERBOARD_CELLS;
        let mut pixels = Vec::with_capacity(size as usize * size as usize * BYTES_PER_PIXEL);

        for y in 0..size {
            for x in 0..size {
                let shade = if (x / cell) % 2 == (y / cell) % 2 {
                    CHECKER_DARK
                } else {
                    CHECKER_LIGHT
                };
                pixels.extend_from_slice(&[shade, shade, shade, 0xff]);
            }
        }

        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// RGBA value of one pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.pixels
            .get(start..start + BYTES_PER_PIXEL)
            .and_then(|p| p.try_into().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_cells() {
        let board = TextureData::checkerboard();
        assert_eq!(board.width, 256);
        assert_eq!(board.pixels.len(), 256 * 256 * 4);

        assert_eq!(board.pixel(0, 0), Some([0x55, 0x55, 0x55, 0xff]));
        assert_eq!(board.pixel(31, 31), Some([0x55, 0x55, 0x55, 0xff]));
        assert_eq!(board.pixel(32, 0), Some([0x6c, 0x6c, 0x6c, 0xff]));
        assert_eq!(board.pixel(0, 32), Some([0x6c, 0x6c, 0x6c, 0xff]));
        assert_eq!(board.pixel(32, 32), Some([0x55, 0x55, 0x55, 0xff]));
        assert_eq!(board.pixel(256, 0), None);
    }

    #[test]
    fn test_from_rgba8_checks_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            TextureData::from_rgba8(2, 2, vec![0; 15]),
            Err(ResourceError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            TextureData::from_rgba8(0, 4, Vec::new()),
            Err(ResourceError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = TextureData::load(Path::new("does/not/exist.png"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
