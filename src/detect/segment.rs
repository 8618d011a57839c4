use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use serde::{Deserialize, Serialize};

/// Pre-threshold smoothing (roughly a 9x9 kernel).
const BLUR_SIGMA: f32 = 2.0;
/// Median window radius after opening (5x5 window).
const MEDIAN_RADIUS: u32 = 2;

const FOREGROUND: u8 = 255;

/// Inclusive HSV range in the 8-bit OpenCV convention (H in 0..=180).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBand {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvBand {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Converts a color frame into a binary marker mask.
///
/// Red wraps around the hue origin, so the marker color is two bands ORed.
#[derive(Clone, Debug)]
pub struct Segmenter {
    bands: [HsvBand; 2],
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::red()
    }
}

impl Segmenter {
    pub fn new(bands: [HsvBand; 2]) -> Self {
        Self { bands }
    }

    pub fn red() -> Self {
        Self::new([
            HsvBand::new([0, 100, 80], [10, 255, 255]),
            HsvBand::new([160, 100, 80], [180, 255, 255]),
        ])
    }

    pub fn bands(&self) -> &[HsvBand; 2] {
        &self.bands
    }

    /// Blur, threshold both hue bands, then open and median-filter the mask.
    ///
    /// Always returns a mask with the frame's dimensions, possibly empty.
    pub fn segment(&self, frame: &RgbImage) -> GrayImage {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }

        let blurred = imageproc::filter::gaussian_blur_f32(frame, BLUR_SIGMA);
        let mut mask = GrayImage::new(width, height);
        for (x, y, pixel) in blurred.enumerate_pixels() {
            let hsv = rgb_to_hsv(pixel.0);
            if self.bands.iter().any(|band| band.contains(hsv)) {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }

        // A 3x3 L1 ball is the cross-shaped 3x3 ellipse.
        let opened = imageproc::morphology::open(&mask, Norm::L1, 1);
        imageproc::filter::median_filter(&opened, MEDIAN_RADIUS, MEDIAN_RADIUS)
    }
}

/// RGB -> HSV with H halved into 0..=180, S and V in 0..=255.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        max as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn hsv_matches_opencv_convention() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([40, 40, 40]), [0, 0, 40]);
        // Magenta-leaning red lands in the upper band.
        assert_eq!(rgb_to_hsv([255, 0, 40])[0], 175);
    }

    #[test]
    fn empty_scene_yields_empty_mask() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([30, 30, 30]));
        let mask = Segmenter::red().segment(&frame);
        assert_eq!(mask.dimensions(), (64, 48));
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn red_disc_segments_as_foreground() {
        let mut frame = RgbImage::from_pixel(120, 100, Rgb([30, 30, 30]));
        draw_filled_circle_mut(&mut frame, (60, 50), 15, Rgb([220, 20, 25]));
        draw_filled_circle_mut(&mut frame, (15, 15), 6, Rgb([20, 200, 30]));

        let mask = Segmenter::red().segment(&frame);
        assert_eq!(mask.get_pixel(60, 50)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(60, 40)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(15, 15)[0], 0);
        assert_eq!(mask.get_pixel(100, 90)[0], 0);
    }

    #[test]
    fn isolated_speckle_is_removed() {
        let mut frame = RgbImage::from_pixel(40, 40, Rgb([30, 30, 30]));
        frame.put_pixel(20, 20, Rgb([255, 0, 0]));
        let mask = Segmenter::red().segment(&frame);
        assert!(mask.pixels().all(|p| p[0] == 0));
    }
}
