//! Per-frame tuning snapshot.
//!
//! The tuning surface (config reloads, an operator UI, tests) owns a mutable
//! `TuningStore`. The frame loop takes one immutable `Tuning` snapshot per
//! frame and threads it through every pipeline stage, so a change made
//! between frames is picked up on the next frame and never mid-frame.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

use crate::detect::DetectorMode;
use crate::track::TargetZone;
use crate::SLOT_COUNT;

pub const DEFAULT_MIN_RADIUS: u32 = 4;
pub const DEFAULT_HOUGH_THRESHOLD: u32 = 8;
pub const DEFAULT_DEADBAND_PX: f32 = 1.0;
pub const DEFAULT_OFF_FRAMES: u32 = 3;
pub const DEFAULT_HOLD_FRAMES: u32 = 4;
pub const MIN_ZONE_DIAMETER: u32 = 5;

/// A target zone expressed relative to the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    /// Center x as a fraction of frame width.
    pub rel_x: f32,
    /// Center y as a fraction of frame height.
    pub rel_y: f32,
    /// Diameter in pixels.
    pub diameter: u32,
}

impl ZoneSpec {
    pub fn new(rel_x: f32, rel_y: f32, diameter: u32) -> Self {
        Self {
            rel_x: rel_x.clamp(0.0, 1.0),
            rel_y: rel_y.clamp(0.0, 1.0),
            diameter: diameter.max(MIN_ZONE_DIAMETER),
        }
    }

    /// Build a zone from pixel coordinates measured on a `width` x `height` frame.
    pub fn from_pixels(x: u32, y: u32, diameter: u32, width: u32, height: u32) -> Self {
        Self::new(
            x as f32 / width.max(1) as f32,
            y as f32 / height.max(1) as f32,
            diameter,
        )
    }

    /// Resolve against the current frame size. Never cache the result across frames.
    pub fn resolve(&self, width: u32, height: u32) -> TargetZone {
        TargetZone {
            center: (
                (self.rel_x * width as f32).floor(),
                (self.rel_y * height as f32).floor(),
            ),
            radius: (self.diameter / 2) as f32,
        }
    }
}

/// Immutable tuning snapshot for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuning {
    pub detector_mode: DetectorMode,
    /// Smallest accepted marker radius in pixels.
    pub min_radius: u32,
    /// Hough accumulator threshold (lower = more detections).
    pub hough_threshold: u32,
    /// Position and hit-margin deadband in pixels.
    pub deadband_px: f32,
    /// Consecutive raw-OFF frames before a hit is released.
    pub off_frames: u32,
    /// Dropout frames a slot keeps reporting its last position.
    pub hold_frames: u32,
    pub zones: [ZoneSpec; SLOT_COUNT],
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            detector_mode: DetectorMode::default(),
            min_radius: DEFAULT_MIN_RADIUS,
            hough_threshold: DEFAULT_HOUGH_THRESHOLD,
            deadband_px: DEFAULT_DEADBAND_PX,
            off_frames: DEFAULT_OFF_FRAMES,
            hold_frames: DEFAULT_HOLD_FRAMES,
            zones: [ZoneSpec::new(0.33, 0.50, 40), ZoneSpec::new(0.66, 0.50, 40)],
        }
    }
}

impl Tuning {
    /// Derive the frame counters from a single stability knob.
    ///
    /// Hold spans twice the release delay so a slot outlives a brief dropout
    /// that the hit output is already ignoring.
    pub fn with_stability_frames(mut self, frames: u32) -> Self {
        self.off_frames = frames.max(1);
        self.hold_frames = frames.saturating_mul(2).max(1);
        self
    }

    pub fn zones_for(&self, width: u32, height: u32) -> [TargetZone; SLOT_COUNT] {
        [
            self.zones[0].resolve(width, height),
            self.zones[1].resolve(width, height),
        ]
    }
}

/// Shared, mutable tuning owned by the tuning surface.
#[derive(Clone, Debug, Default)]
pub struct TuningStore {
    inner: Arc<RwLock<Tuning>>,
}

impl TuningStore {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tuning)),
        }
    }

    /// Copy out the current tuning for one frame.
    pub fn snapshot(&self) -> Tuning {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, tuning: Tuning) {
        self.update(|current| *current = tuning);
    }

    pub fn update<F: FnOnce(&mut Tuning)>(&self, f: F) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_resolves_against_current_frame_size() {
        let spec = ZoneSpec::new(0.5, 0.25, 40);
        let small = spec.resolve(640, 480);
        assert_eq!(small.center, (320.0, 120.0));
        assert_eq!(small.radius, 20.0);

        let large = spec.resolve(1280, 960);
        assert_eq!(large.center, (640.0, 240.0));
        assert_eq!(large.radius, 20.0);
    }

    #[test]
    fn zone_spec_clamps_inputs() {
        let spec = ZoneSpec::new(1.7, -0.2, 2);
        assert_eq!(spec.rel_x, 1.0);
        assert_eq!(spec.rel_y, 0.0);
        assert_eq!(spec.diameter, MIN_ZONE_DIAMETER);

        let px = ZoneSpec::from_pixels(320, 240, 41, 640, 480);
        assert_eq!(px.rel_x, 0.5);
        assert_eq!(px.rel_y, 0.5);
        assert_eq!(px.resolve(640, 480).radius, 20.0);
    }

    #[test]
    fn stability_frames_derive_counters() {
        let tuning = Tuning::default().with_stability_frames(3);
        assert_eq!(tuning.off_frames, 3);
        assert_eq!(tuning.hold_frames, 6);

        let tuning = Tuning::default().with_stability_frames(0);
        assert_eq!(tuning.off_frames, 1);
        assert_eq!(tuning.hold_frames, 1);
    }

    #[test]
    fn store_hands_out_independent_snapshots() {
        let store = TuningStore::new(Tuning::default());
        let before = store.snapshot();
        store.update(|t| t.deadband_px = 3.0);
        let after = store.snapshot();
        assert_eq!(before.deadband_px, DEFAULT_DEADBAND_PX);
        assert_eq!(after.deadband_px, 3.0);
    }
}
