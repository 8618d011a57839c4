use image::GrayImage;

use crate::detect::Candidate;
use crate::tuning::Tuning;

/// Markers tracked per frame.
pub const DEFAULT_MAX_COUNT: usize = 2;

/// Tunables a detector reads for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    /// Smallest accepted radius in pixels.
    pub min_radius: u32,
    /// Hough accumulator threshold. Ignored by the contour backend.
    pub hough_threshold: u32,
    /// Upper bound on returned candidates.
    pub max_count: usize,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self::from_tuning(&Tuning::default())
    }
}

impl DetectParams {
    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self {
            min_radius: tuning.min_radius,
            hough_threshold: tuning.hough_threshold,
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

/// Candidate detector backend.
///
/// Implementations must be deterministic: the same mask and params always
/// yield the same candidates. Output is sorted by radius, largest first, and
/// never longer than `params.max_count`. An empty result is not an error.
pub trait CandidateDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Extract circular candidates from a binary mask.
    fn detect(&mut self, mask: &GrayImage, params: &DetectParams) -> Vec<Candidate>;
}
