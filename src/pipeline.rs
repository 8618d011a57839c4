//! Per-frame processing.
//!
//! `PipelineState` owns everything that must survive from one frame to the
//! next (detector scratch buffers, slots, hit states). The frame loop hands it
//! one frame plus that frame's tuning snapshot and gets a `FrameReport` back.

use image::GrayImage;

use crate::detect::{Candidate, DetectParams, DetectorSet, Segmenter};
use crate::frame::Frame;
use crate::track::{HitEvaluator, IdentityTracker, TargetZone};
use crate::transport::HitPair;
use crate::tuning::Tuning;
use crate::SLOT_COUNT;

/// What one frame produced.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Raw candidates, largest first.
    pub candidates: Vec<Candidate>,
    /// Smoothed slot positions (display only).
    pub slots: [Option<Candidate>; SLOT_COUNT],
    /// Zones resolved against this frame's size.
    pub zones: [TargetZone; SLOT_COUNT],
    /// Hysteresis state before debouncing.
    pub raw_hits: [bool; SLOT_COUNT],
    pub hits: HitPair,
    /// The debounced pair differs from the previous frame's.
    pub changed: bool,
}

pub struct PipelineState {
    segmenter: Segmenter,
    detectors: DetectorSet,
    tracker: IdentityTracker,
    hits: HitEvaluator,
    last_hits: HitPair,
    frames: u64,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(Segmenter::default())
    }
}

impl PipelineState {
    pub fn new(segmenter: Segmenter) -> Self {
        Self::with_detectors(segmenter, DetectorSet::new())
    }

    pub fn with_detectors(segmenter: Segmenter, detectors: DetectorSet) -> Self {
        Self {
            segmenter,
            detectors,
            tracker: IdentityTracker::new(),
            hits: HitEvaluator::new(),
            last_hits: HitPair::default(),
            frames: 0,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn hits(&self) -> HitPair {
        self.last_hits
    }

    pub fn process_frame(&mut self, frame: &Frame, tuning: &Tuning) -> FrameReport {
        let mask = self.segmenter.segment(&frame.image);
        self.process_mask(frame.sequence, &mask, tuning)
    }

    /// Run everything after segmentation on a precomputed mask.
    pub fn process_mask(&mut self, sequence: u64, mask: &GrayImage, tuning: &Tuning) -> FrameReport {
        let (width, height) = mask.dimensions();
        let params = DetectParams::from_tuning(tuning);
        let candidates = self.detectors.detect(tuning.detector_mode, mask, &params);

        let slots = self
            .tracker
            .update(&candidates, tuning.deadband_px, tuning.hold_frames);

        let zones = tuning.zones_for(width, height);
        let debounced =
            self.hits
                .evaluate(&zones, &candidates, tuning.deadband_px, tuning.off_frames);
        let raw_hits = [self.hits.states()[0].raw, self.hits.states()[1].raw];

        let hits = HitPair::from(debounced);
        let changed = hits != self.last_hits;
        self.last_hits = hits;
        self.frames += 1;

        log::trace!(
            "frame {}: {} candidates, hits {:?}",
            sequence,
            candidates.len(),
            debounced
        );

        FrameReport {
            sequence,
            width,
            height,
            candidates,
            slots,
            zones,
            raw_hits,
            hits,
            changed,
        }
    }
}
