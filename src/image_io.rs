//! Raster decoding and PNG re-encoding.

use image::{codecs::png::PngEncoder, DynamicImage, ExtendedColorType, ImageEncoder};
use log::debug;

use crate::error::{ImageCryptoError, Result};
use crate::types::Image;

/// Decodes any supported raster format into 8-bit pixels, keeping grey,
/// grey+alpha, RGB or RGBA layout. Deeper formats are narrowed to 8 bits.
pub fn decode(bytes: &[u8]) -> Result<Image> {
    let dynamic = image::load_from_memory(bytes)?;
    let (width, height) = (dynamic.width(), dynamic.height());
    let (height, width) = match (u16::try_from(height), u16::try_from(width)) {
        (Ok(h), Ok(w)) => (h, w),
        _ => {
            return Err(ImageCryptoError::DecodeError(format!(
                "{}x{} exceeds the {} pixel limit per side",
                width, height, u16::MAX
            )));
        }
    };

    let (channels, pixels) = match dynamic {
        DynamicImage::ImageLuma8(buf) => (1, buf.into_raw()),
        DynamicImage::ImageLumaA8(buf) => (2, buf.into_raw()),
        DynamicImage::ImageRgb8(buf) => (3, buf.into_raw()),
        DynamicImage::ImageRgba8(buf) => (4, buf.into_raw()),
        other if other.color().has_alpha() => (4, other.to_rgba8().into_raw()),
        other if other.color().has_color() => (3, other.to_rgb8().into_raw()),
        other => (1, other.to_luma8().into_raw()),
    };

    debug!("Decoded {}x{}x{} image ({} bytes)", height, width, channels, pixels.len());
    Image::new(height, width, channels, pixels)
        .map_err(|e| ImageCryptoError::DecodeError(e.to_string()))
}

pub fn encode_png(image: &Image) -> Result<Vec<u8>> {
    let color = match image.channels() {
        1 => ExtendedColorType::L8,
        2 => ExtendedColorType::La8,
        3 => ExtendedColorType::Rgb8,
        4 => ExtendedColorType::Rgba8,
        n => {
            return Err(ImageCryptoError::EncodeError(format!(
                "PNG cannot hold {} channels per pixel", n
            )));
        }
    };

    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.pixels(), image.width() as u32, image.height() as u32, color)
        .map_err(|e| ImageCryptoError::EncodeError(e.to_string()))?;
    Ok(out)
}
