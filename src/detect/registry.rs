use image::GrayImage;

use crate::detect::backend::{CandidateDetector, DetectParams};
use crate::detect::{Candidate, ContourDetector, DetectorMode, HoughDetector};

/// Both detector backends, selected per frame by [`DetectorMode`].
///
/// Backends keep scratch state between frames, so they live for the whole run
/// and switching modes never reallocates.
pub struct DetectorSet {
    fast: Box<dyn CandidateDetector>,
    robust: Box<dyn CandidateDetector>,
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::with_backends(Box::new(ContourDetector::new()), Box::new(HoughDetector::new()))
    }

    /// Swap in custom backends, e.g. for tests.
    pub fn with_backends(
        fast: Box<dyn CandidateDetector>,
        robust: Box<dyn CandidateDetector>,
    ) -> Self {
        Self { fast, robust }
    }

    pub fn backend(&mut self, mode: DetectorMode) -> &mut dyn CandidateDetector {
        match mode {
            DetectorMode::Fast => self.fast.as_mut(),
            DetectorMode::Robust => self.robust.as_mut(),
        }
    }

    pub fn backend_name(&self, mode: DetectorMode) -> &'static str {
        match mode {
            DetectorMode::Fast => self.fast.name(),
            DetectorMode::Robust => self.robust.name(),
        }
    }

    pub fn detect(
        &mut self,
        mode: DetectorMode,
        mask: &GrayImage,
        params: &DetectParams,
    ) -> Vec<Candidate> {
        self.backend(mode).detect(mask, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    struct Fixed(Vec<Candidate>);

    impl CandidateDetector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _mask: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
            self.0.iter().copied().take(params.max_count).collect()
        }
    }

    #[test]
    fn dispatches_by_mode() {
        let mut set = DetectorSet::with_backends(
            Box::new(Fixed(vec![Candidate::new(1.0, 1.0, 5.0)])),
            Box::new(Fixed(Vec::new())),
        );
        let mask = GrayImage::new(10, 10);
        let params = DetectParams::default();
        assert_eq!(set.detect(DetectorMode::Fast, &mask, &params).len(), 1);
        assert!(set.detect(DetectorMode::Robust, &mask, &params).is_empty());
    }

    #[test]
    fn default_backends_agree_on_clean_disc() {
        let mut mask = GrayImage::new(160, 120);
        draw_filled_circle_mut(&mut mask, (80, 60), 25, Luma([255u8]));
        let mut set = DetectorSet::new();
        let params = DetectParams::default();

        assert_eq!(set.backend_name(DetectorMode::Fast), "contour");
        assert_eq!(set.backend_name(DetectorMode::Robust), "hough");

        let fast = set.detect(DetectorMode::Fast, &mask, &params);
        let robust = set.detect(DetectorMode::Robust, &mask, &params);
        assert_eq!(fast.len(), 1);
        assert_eq!(robust.len(), 1);
        assert!(fast[0].distance_to(robust[0].center) <= 3.0);
    }
}
