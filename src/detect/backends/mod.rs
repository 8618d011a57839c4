pub mod contour;
pub mod hough;

pub use contour::ContourDetector;
pub use hough::HoughDetector;
