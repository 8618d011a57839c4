//! Synthetic camera (`stub://`).
//!
//! Renders two red discs on a dark background. Each disc swings horizontally
//! across one of the default target zones, so a running daemon produces hit
//! transitions on both outputs without any hardware attached.

use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use std::f32::consts::PI;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::ingest::{CameraConfig, SourceStats};

const BACKGROUND: Rgb<u8> = Rgb([24, 28, 32]);
const MARKER: Rgb<u8> = Rgb([220, 24, 28]);
/// Frames per full swing.
const PERIOD_FRAMES: u64 = 120;
const LANES: [(f32, f32); 2] = [(0.33, 0.50), (0.66, 0.50)];
/// Swing half-width as a fraction of frame width.
const AMPLITUDE: f32 = 0.08;

pub struct SyntheticSource {
    config: CameraConfig,
    frame_count: u64,
    connected: bool,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
            next_due: None,
        }
    }

    /// Synthetic sources are always "connected".
    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.next_due = None;
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.config.width = width;
        self.config.height = height;
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.pace();
        let image = render(self.config.width, self.config.height, self.frame_count);
        let frame = Frame::new(image, self.frame_count);
        self.frame_count += 1;
        Ok(frame)
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
            width: self.config.width,
            height: self.config.height,
        }
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + interval);
    }
}

/// Marker radius used for a frame of the given height.
pub fn marker_radius(height: u32) -> i32 {
    (height as i32 / 16).max(8)
}

/// Marker centers for frame `index`.
pub fn marker_centers(width: u32, height: u32, index: u64) -> [(i32, i32); 2] {
    let phase = (index % PERIOD_FRAMES) as f32 / PERIOD_FRAMES as f32 * 2.0 * PI;
    let w = width as f32;
    let h = height as f32;
    let swing = AMPLITUDE * w;
    [
        (
            (LANES[0].0 * w + swing * phase.sin()).round() as i32,
            (LANES[0].1 * h).round() as i32,
        ),
        (
            (LANES[1].0 * w - swing * phase.sin()).round() as i32,
            (LANES[1].1 * h).round() as i32,
        ),
    ]
}

fn render(width: u32, height: u32, index: u64) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);
    let radius = marker_radius(height);
    for center in marker_centers(width, height, index) {
        draw_filled_circle_mut(&mut image, center, radius, MARKER);
    }
    image
}
