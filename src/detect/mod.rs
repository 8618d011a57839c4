//! Marker segmentation and candidate detection.
//!
//! A frame is first reduced to a binary mask of marker-colored pixels, then one
//! of two interchangeable detector backends extracts circular candidates from
//! the mask. Both backends return at most `max_count` candidates sorted by
//! radius, largest first. Finding nothing is a normal result.

mod backend;
mod backends;
mod candidate;
mod registry;
mod segment;
pub(crate) mod shape;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use backend::{CandidateDetector, DetectParams};
pub use backends::{ContourDetector, HoughDetector};
pub use candidate::Candidate;
pub(crate) use candidate::rank_by_radius;
pub use registry::DetectorSet;
pub use segment::{rgb_to_hsv, HsvBand, Segmenter};

/// Which detector backend runs for a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorMode {
    /// Contour tracing + circularity. One pass over the mask.
    Fast,
    /// Hough circle transform with shape validation and a 2x refinement pass.
    #[default]
    Robust,
}

impl DetectorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorMode::Fast => "fast",
            DetectorMode::Robust => "robust",
        }
    }
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "contour" | "contours" => Ok(DetectorMode::Fast),
            "robust" | "hough" => Ok(DetectorMode::Robust),
            other => Err(anyhow::anyhow!(
                "unknown detector mode '{}' (expected fast or robust)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_mode_parses_aliases() {
        assert_eq!("fast".parse::<DetectorMode>().unwrap(), DetectorMode::Fast);
        assert_eq!(" Hough ".parse::<DetectorMode>().unwrap(), DetectorMode::Robust);
        assert!("sonar".parse::<DetectorMode>().is_err());
        assert_eq!(DetectorMode::default(), DetectorMode::Robust);
    }
}
