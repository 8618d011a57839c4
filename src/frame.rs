//! Owned camera frames.
//!
//! Sources hand the frame loop an RGB image plus bookkeeping. The loop reads
//! the frame size every cycle, so a source may change resolution between two
//! frames without any coordination.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Instant;

/// One decoded RGB frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic per-source counter, starting at 0 after each connect.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Wrap packed RGB24 bytes. Fails when the buffer does not match the size.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "rgb buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("invalid rgb frame {}x{}", width, height))?;
        Ok(Self::new(image, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
