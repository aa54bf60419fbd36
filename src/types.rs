use crate::error::{ImageCryptoError, Result};

/// Dense 8-bit raster: `height` rows of `width` pixels, each pixel
/// `channels` interleaved bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    height: u16,
    width: u16,
    channels: u16,
    pixels: Vec<u8>,
}

impl Image {
    pub fn new(height: u16, width: u16, channels: u16, pixels: Vec<u8>) -> Result<Self> {
        if channels == 0 {
            return Err(ImageCryptoError::DimensionMismatchError(
                "channel count must be at least 1".to_string()
            ));
        }

        let expected = Self::byte_len_for(height, width, channels);
        if pixels.len() != expected {
            return Err(ImageCryptoError::DimensionMismatchError(format!(
                "shape {}x{}x{} needs {} bytes, got {}",
                height, width, channels, expected, pixels.len()
            )));
        }

        Ok(Self { height, width, channels, pixels })
    }

    pub fn byte_len_for(height: u16, width: u16, channels: u16) -> usize {
        height as usize * width as usize * channels as usize
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of pixel positions (height × width).
    pub fn pixel_count(&self) -> usize {
        self.height as usize * self.width as usize
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Same shape, different pixel bytes.
    pub fn with_pixels(&self, pixels: Vec<u8>) -> Result<Self> {
        Self::new(self.height, self.width, self.channels, pixels)
    }
}
