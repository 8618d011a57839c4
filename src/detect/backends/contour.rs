use image::GrayImage;

use crate::detect::backend::{CandidateDetector, DetectParams};
use crate::detect::shape::{min_enclosing_circle, outer_outlines};
use crate::detect::{rank_by_radius, Candidate};

/// Blobs smaller than this (px^2) are noise.
const MIN_AREA: f64 = 80.0;
const MAX_RADIUS: f64 = 100.0;
const MIN_CIRCULARITY: f64 = 0.75;

/// Fast backend: trace outer blob borders and keep the round ones.
#[derive(Debug, Default)]
pub struct ContourDetector;

impl ContourDetector {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateDetector for ContourDetector {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn detect(&mut self, mask: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
        let mut found = Vec::new();
        for outline in outer_outlines(mask) {
            if outline.area < MIN_AREA {
                continue;
            }
            let Some((x, y, r)) = min_enclosing_circle(&outline.points) else {
                continue;
            };
            if r < params.min_radius as f64 || r > MAX_RADIUS {
                continue;
            }
            if outline.perimeter <= 0.0 {
                continue;
            }
            if outline.circularity() > MIN_CIRCULARITY {
                found.push(Candidate::new(x as f32, y as f32, r as f32));
            }
        }
        rank_by_radius(found, params.max_count)
    }
}
