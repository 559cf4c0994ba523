//! Frame decode and geometry normalization
//!
//! Inbound payloads are compressed still images (the capture client sends
//! JPEG, but anything the `image` crate recognizes is accepted). Every
//! decoded frame is normalized to the canonical output geometry before it
//! is buffered: orientation-corrected, scaled to the fixed target size,
//! and flattened to RGB24 so the encoder always sees identical frames.

use image::imageops::FilterType;
use image::{ColorType, DynamicImage};

use super::error::FrameError;

/// Decode a compressed frame payload into pixel data.
pub fn decode_frame(payload: &[u8]) -> Result<DynamicImage, FrameError> {
    Ok(image::load_from_memory(payload)?)
}

/// Normalizes decoded frames into the canonical output geometry.
///
/// Deterministic and side-effect-free: the same input frame always yields
/// the same output buffer.
#[derive(Debug, Clone, Copy)]
pub struct FrameTransformer {
    width: u32,
    height: u32,
}

impl FrameTransformer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of every buffer this transformer produces
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Convert a decoded frame into a canonical RGB24 buffer.
    ///
    /// A portrait source feeding a landscape target (or the reverse) is
    /// rotated a quarter turn clockwise before scaling; phone screens
    /// stream portrait into a landscape canvas.
    pub fn transform(&self, frame: DynamicImage) -> Result<Vec<u8>, FrameError> {
        match frame.color() {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {}
            layout => return Err(FrameError::UnsupportedFormat { layout }),
        }

        let oriented = if is_portrait(frame.width(), frame.height())
            != is_portrait(self.width, self.height)
        {
            frame.rotate90()
        } else {
            frame
        };

        let scaled = if oriented.width() == self.width && oriented.height() == self.height {
            oriented
        } else {
            oriented.resize_exact(self.width, self.height, FilterType::Triangle)
        };

        Ok(scaled.into_rgb8().into_raw())
    }
}

fn is_portrait(width: u32, height: u32) -> bool {
    height > width
}
