use std::time::Instant;

use crate::PixelFormat;

/// CPU-side pixel storage for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSurface {
    pub data: Vec<u8>,
    pub bytes_per_row: u32,
}

/// A single captured image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonically increasing within one stream, starting at 1.
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub surface: FrameSurface,
    pub pixel_format: PixelFormat,
    pub captured_at: Instant,
}

impl Frame {
    /// Build a BGRA frame from tightly packed rows.
    pub fn from_bgra(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            surface: FrameSurface {
                data,
                bytes_per_row: width * PixelFormat::Bgra8.bytes_per_pixel(),
            },
            pixel_format: PixelFormat::Bgra8,
            captured_at: Instant::now(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
