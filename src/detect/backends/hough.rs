//! Robust backend: gradient Hough circle transform plus shape validation.
//!
//! Every edge pixel votes along its gradient direction for all radii in range.
//! Accumulator peaks become center hypotheses. Each hypothesis is seeded with
//! the best-supported distance to the mask's inner boundary and then refined
//! by least-squares circle fits over a band of boundary pixels, so an
//! off-center peak still converges onto the arc it sits next to. Raw circles
//! then have to look like a filled disc in the mask (circularity and fill
//! ratio) before they become candidates, and a circle whose center falls
//! inside an already kept one is the same disc. When fewer than `max_count`
//! pass, the mask is upsampled 2x and the transform is rerun to recover small
//! or weak circles; those results are validated back on the original-resolution
//! mask.

use image::imageops::{self, FilterType};
use image::GrayImage;
use std::f64::consts::PI;

use crate::detect::backend::{CandidateDetector, DetectParams};
use crate::detect::shape::{count_inside_circle, largest_outline};
use crate::detect::{rank_by_radius, Candidate};

/// Inverse accumulator resolution.
const DP: f32 = 1.2;
/// Canny upper threshold; the lower one is half of it.
const CANNY_HIGH: f32 = 100.0;
const EDGE_SIGMA: f32 = 1.4;
/// Hypotheses examined per pass.
const MAX_CIRCLES: usize = 32;
const MIN_CIRCULARITY: f64 = 0.87;
const FILL_RATIO_RANGE: (f64, f64) = (0.75, 1.25);
/// Half width of the boundary band a refinement step fits against.
const FIT_BAND: f64 = 2.0;
const FIT_ITERATIONS: usize = 8;
/// Center shift below which refinement stops early.
const FIT_CONVERGED: f64 = 0.05;
/// Boundary pixels within this distance of the final circle count as support.
const SUPPORT_BAND: f64 = 1.5;
/// Centers this close are one disc whatever the radii.
const DEDUP_DIST_SQ: i64 = 25;

/// One transform pass configuration, in the pixel units of the image it runs on.
#[derive(Clone, Copy, Debug)]
struct HoughPass {
    min_dist: f32,
    min_radius: u32,
    threshold: u32,
}

#[derive(Clone, Copy, Debug)]
struct EdgeVote {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
}

/// A raw circle straight out of the transform.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RawCircle {
    x: f32,
    y: f32,
    r: f32,
}

#[derive(Debug, Default)]
pub struct HoughDetector {
    accumulator: Vec<u32>,
}

impl HoughDetector {
    pub fn new() -> Self {
        Self::default()
    }

    fn transform(&mut self, mask: &GrayImage, pass: HoughPass) -> Vec<RawCircle> {
        let (w, h) = mask.dimensions();
        if w < 3 || h < 3 {
            return Vec::new();
        }

        let votes = edge_votes(mask);
        if votes.is_empty() {
            return Vec::new();
        }
        let boundary = inner_boundary(mask);
        let min_r = pass.min_radius.max(1);
        let max_r = w.max(h);

        let aw = (w as f32 / DP).ceil() as usize + 1;
        let ah = (h as f32 / DP).ceil() as usize + 1;
        self.accumulator.clear();
        self.accumulator.resize(aw * ah, 0);

        for vote in &votes {
            for sign in [1.0f32, -1.0] {
                for r in min_r..=max_r {
                    let cx = vote.x + sign * vote.dx * r as f32;
                    let cy = vote.y + sign * vote.dy * r as f32;
                    if cx < 0.0 || cy < 0.0 || cx >= w as f32 || cy >= h as f32 {
                        break;
                    }
                    let ax = (cx / DP) as usize;
                    let ay = (cy / DP) as usize;
                    self.accumulator[ay * aw + ax] += 1;
                }
            }
        }

        let peaks = local_peaks(&self.accumulator, aw, ah, pass.threshold);
        let min_dist_sq = pass.min_dist * pass.min_dist;
        let mut circles: Vec<RawCircle> = Vec::new();
        let crowded = |circles: &[RawCircle], x: f32, y: f32| {
            circles.iter().any(|c| {
                let dx = c.x - x;
                let dy = c.y - y;
                dx * dx + dy * dy < min_dist_sq
            })
        };
        for (_, idx) in peaks {
            let cx = ((idx % aw) as f32 + 0.5) * DP;
            let cy = ((idx / aw) as f32 + 0.5) * DP;
            if crowded(&circles, cx, cy) {
                continue;
            }
            let Some(circle) =
                fit_circle(&boundary, cx, cy, min_r as f32, max_r as f32, pass.threshold)
            else {
                continue;
            };
            // Distant peaks often converge onto a circle already found.
            if crowded(&circles, circle.x, circle.y) {
                continue;
            }
            circles.push(circle);
            if circles.len() >= MAX_CIRCLES {
                break;
            }
        }
        circles
    }
}

impl CandidateDetector for HoughDetector {
    fn name(&self) -> &'static str {
        "hough"
    }

    fn detect(&mut self, mask: &GrayImage, params: &DetectParams) -> Vec<Candidate> {
        let min_radius = params.min_radius.max(1);
        let min_dist = min_radius.saturating_mul(6).max(12) as f32;
        let first = HoughPass {
            min_dist,
            min_radius,
            threshold: params.hough_threshold,
        };

        let mut kept: Vec<(i64, i64, i64)> = Vec::new();
        for circle in self.transform(mask, first) {
            let (x, y, r) = (
                circle.x.round() as i64,
                circle.y.round() as i64,
                circle.r.round() as i64,
            );
            if validate_disc(mask, x, y, r) && !is_duplicate(&kept, x, y, r) {
                kept.push((x, y, r));
            }
        }

        if kept.len() < params.max_count {
            let (w, h) = mask.dimensions();
            let upsampled = imageops::resize(mask, w * 2, h * 2, FilterType::Triangle);
            let second = HoughPass {
                min_dist: min_dist * 2.0,
                min_radius: min_radius.max(2).saturating_mul(2),
                threshold: params.hough_threshold,
            };
            for circle in self.transform(&upsampled, second) {
                // Upsampled pixel u samples the original at u / 2 - 0.25.
                let (x, y, r) = (
                    ((circle.x - 0.5) / 2.0).round() as i64,
                    ((circle.y - 0.5) / 2.0).round() as i64,
                    (circle.r / 2.0).round() as i64,
                );
                // Validation deliberately uses the original-resolution mask.
                if validate_disc(mask, x, y, r) && !is_duplicate(&kept, x, y, r) {
                    kept.push((x, y, r));
                }
            }
        }

        let found = kept
            .into_iter()
            .map(|(x, y, r)| Candidate::new(x as f32, y as f32, r as f32))
            .collect();
        rank_by_radius(found, params.max_count)
    }
}

/// Edge pixels with a usable gradient direction.
fn edge_votes(mask: &GrayImage) -> Vec<EdgeVote> {
    let edges = imageproc::edges::canny(mask, CANNY_HIGH / 2.0, CANNY_HIGH);
    let smoothed = imageproc::filter::gaussian_blur_f32(mask, EDGE_SIGMA);
    let gx = imageproc::gradients::horizontal_sobel(&smoothed);
    let gy = imageproc::gradients::vertical_sobel(&smoothed);

    let mut votes = Vec::new();
    for (x, y, edge) in edges.enumerate_pixels() {
        if edge[0] == 0 {
            continue;
        }
        let gxv = gx.get_pixel(x, y)[0] as f32;
        let gyv = gy.get_pixel(x, y)[0] as f32;
        let mag = (gxv * gxv + gyv * gyv).sqrt();
        if mag < 1e-3 {
            continue;
        }
        votes.push(EdgeVote {
            x: x as f32,
            y: y as f32,
            dx: gxv / mag,
            dy: gyv / mag,
        });
    }
    votes
}

/// Foreground pixels with at least one 4-connected background neighbor.
fn inner_boundary(mask: &GrayImage) -> Vec<(f32, f32)> {
    let (w, h) = mask.dimensions();
    let on = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && x < w as i64 && y < h as i64 && mask.get_pixel(x as u32, y as u32)[0] > 127
    };
    let mut boundary = Vec::new();
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            if !on(x, y) {
                continue;
            }
            if !on(x - 1, y) || !on(x + 1, y) || !on(x, y - 1) || !on(x, y + 1) {
                boundary.push((x as f32, y as f32));
            }
        }
    }
    boundary
}

/// Accumulator cells above `threshold` that dominate their 4-neighborhood,
/// strongest first. Ties keep raster order.
fn local_peaks(acc: &[u32], aw: usize, ah: usize, threshold: u32) -> Vec<(u32, usize)> {
    let mut peaks = Vec::new();
    for y in 1..ah.saturating_sub(1) {
        for x in 1..aw.saturating_sub(1) {
            let idx = y * aw + x;
            let v = acc[idx];
            if v > threshold
                && v > acc[idx - 1]
                && v >= acc[idx + 1]
                && v > acc[idx - aw]
                && v >= acc[idx + aw]
            {
                peaks.push((v, idx));
            }
        }
    }
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    peaks
}

/// Fit a circle to the boundary near the hypothesis `(cx, cy)`.
///
/// The seed radius is the distance band with the most boundary support. The
/// circle is then refit to the pixels within `FIT_BAND` of it until the center
/// settles. The result needs `threshold` supporting pixels and a radius in
/// `[min_r, max_r]`.
fn fit_circle(
    boundary: &[(f32, f32)],
    cx: f32,
    cy: f32,
    min_r: f32,
    max_r: f32,
    threshold: u32,
) -> Option<RawCircle> {
    let bins = max_r.ceil() as usize + 2;
    let mut hist = vec![0u32; bins];
    for &(x, y) in boundary {
        let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
        if d >= min_r && d <= max_r {
            hist[d as usize] += 1;
        }
    }

    let mut best: Option<(u32, usize)> = None;
    for bin in 1..bins - 1 {
        let support = hist[bin - 1] + hist[bin] + hist[bin + 1];
        if support > 0 && best.map_or(true, |(s, _)| support > s) {
            best = Some((support, bin));
        }
    }
    let (support, bin) = best?;
    if support < threshold {
        return None;
    }

    let (min_r, max_r) = (min_r as f64, max_r as f64);
    let min_inliers = threshold.max(3) as usize;
    let mut circle = (cx as f64, cy as f64, bin as f64 + 0.5);
    for _ in 0..FIT_ITERATIONS {
        let inliers: Vec<(f64, f64)> = boundary
            .iter()
            .map(|&(x, y)| (x as f64, y as f64))
            .filter(|&(x, y)| (distance(x, y, circle.0, circle.1) - circle.2).abs() <= FIT_BAND)
            .collect();
        if inliers.len() < min_inliers {
            return None;
        }
        let Some(next) = least_squares_circle(&inliers) else {
            break;
        };
        if next.2 < min_r || next.2 > max_r {
            return None;
        }
        let shift = distance(next.0, next.1, circle.0, circle.1);
        circle = next;
        if shift < FIT_CONVERGED {
            break;
        }
    }

    let support = boundary
        .iter()
        .filter(|&&(x, y)| {
            (distance(x as f64, y as f64, circle.0, circle.1) - circle.2).abs() <= SUPPORT_BAND
        })
        .count();
    if support < threshold as usize {
        return None;
    }
    Some(RawCircle {
        x: circle.0 as f32,
        y: circle.1 as f32,
        r: circle.2 as f32,
    })
}

fn distance(x0: f64, y0: f64, x1: f64, y1: f64) -> f64 {
    ((x0 - x1).powi(2) + (y0 - y1).powi(2)).sqrt()
}

/// Algebraic least-squares circle through `points` as `(x, y, r)`.
///
/// Solved in mean-centered coordinates; `None` when the points are collinear.
fn least_squares_circle(points: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    if points.len() < 3 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut suu, mut svv, mut suv) = (0.0, 0.0, 0.0);
    let (mut suuu, mut svvv, mut suvv, mut svuu) = (0.0, 0.0, 0.0, 0.0);
    for &(x, y) in points {
        let (u, v) = (x - mx, y - my);
        suu += u * u;
        svv += v * v;
        suv += u * v;
        suuu += u * u * u;
        svvv += v * v * v;
        suvv += u * v * v;
        svuu += v * u * u;
    }

    let det = suu * svv - suv * suv;
    if det.abs() < 1e-9 {
        return None;
    }
    let a = 0.5 * (suuu + suvv);
    let b = 0.5 * (svvv + svuu);
    let uc = (a * svv - b * suv) / det;
    let vc = (b * suu - a * suv) / det;
    let r = (uc * uc + vc * vc + (suu + svv) / n).sqrt();
    Some((uc + mx, vc + my, r))
}

/// Is `(x, y, r)` a disc already in `kept`? Either center inside the other
/// circle means the same disc.
fn is_duplicate(kept: &[(i64, i64, i64)], x: i64, y: i64, r: i64) -> bool {
    kept.iter().any(|&(kx, ky, kr)| {
        let reach = kr.max(r);
        let dist_sq = (kx - x).pow(2) + (ky - y).pow(2);
        dist_sq <= DEDUP_DIST_SQ || dist_sq < reach * reach
    })
}

/// Does the mask around `(x, y, r)` look like a filled disc?
///
/// Crops the circle's bounding box, takes the largest blob inside it, and
/// checks its circularity plus how much of the ideal disc is foreground.
fn validate_disc(mask: &GrayImage, x: i64, y: i64, r: i64) -> bool {
    if r <= 0 {
        return false;
    }
    let (w, h) = mask.dimensions();
    let x0 = (x - r).max(0);
    let y0 = (y - r).max(0);
    let x1 = (x + r + 1).min(w as i64);
    let y1 = (y + r + 1).min(h as i64);
    if x1 <= x0 || y1 <= y0 {
        return false;
    }

    let roi = imageops::crop_imm(mask, x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
        .to_image();
    let Some(blob) = largest_outline(&roi) else {
        return false;
    };
    if blob.area <= 0.0 || blob.perimeter <= 0.0 {
        return false;
    }

    let filled = count_inside_circle(&roi, x - x0, y - y0, r) as f64;
    let fill_ratio = filled / (PI * (r * r) as f64);
    blob.circularity() >= MIN_CIRCULARITY
        && fill_ratio >= FILL_RATIO_RANGE.0
        && fill_ratio <= FILL_RATIO_RANGE.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const ON: Luma<u8> = Luma([255]);

    #[test]
    fn empty_mask_yields_nothing() {
        let mask = GrayImage::new(160, 120);
        assert!(HoughDetector::new()
            .detect(&mask, &DetectParams::default())
            .is_empty());
    }

    #[test]
    fn validates_filled_disc_and_rejects_square() {
        let mut mask = GrayImage::new(120, 120);
        draw_filled_circle_mut(&mut mask, (40, 40), 25, ON);
        draw_filled_rect_mut(&mut mask, Rect::at(80, 80).of_size(30, 30), ON);

        assert!(validate_disc(&mask, 40, 40, 25));
        assert!(validate_disc(&mask, 40, 40, 24));
        assert!(!validate_disc(&mask, 95, 95, 15));
        assert!(!validate_disc(&mask, 40, 40, 0));
    }

    #[test]
    fn finds_single_disc() {
        let mut mask = GrayImage::new(160, 120);
        draw_filled_circle_mut(&mut mask, (70, 60), 25, ON);

        let found = HoughDetector::new().detect(&mask, &DetectParams::default());
        assert_eq!(found.len(), 1, "{:?}", found);
        assert!((found[0].center.0 - 70.0).abs() <= 2.0);
        assert!((found[0].center.1 - 60.0).abs() <= 2.0);
        assert!((found[0].radius - 25.0).abs() <= 2.0);
    }

    #[test]
    fn output_is_ranked_and_bounded() {
        let mut mask = GrayImage::new(320, 120);
        draw_filled_circle_mut(&mut mask, (60, 60), 25, ON);
        draw_filled_circle_mut(&mut mask, (160, 60), 30, ON);
        draw_filled_circle_mut(&mut mask, (260, 60), 28, ON);

        let found = HoughDetector::new().detect(&mask, &DetectParams::default());
        assert!(found.len() <= 2);
        for pair in found.windows(2) {
            assert!(pair[0].radius >= pair[1].radius);
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let mut mask = GrayImage::new(200, 120);
        draw_filled_circle_mut(&mut mask, (60, 60), 25, ON);
        draw_filled_circle_mut(&mut mask, (145, 55), 27, ON);

        let mut detector = HoughDetector::new();
        let a = detector.detect(&mask, &DetectParams::default());
        let b = detector.detect(&mask, &DetectParams::default());
        let c = HoughDetector::new().detect(&mask, &DetectParams::default());
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn fit_circle_recovers_ring() {
        let boundary: Vec<(f32, f32)> = (0..360)
            .map(|deg| {
                let t = (deg as f32).to_radians();
                (50.0 + 20.0 * t.cos(), 40.0 + 20.0 * t.sin())
            })
            .collect();
        let circle = fit_circle(&boundary, 50.5, 40.5, 4.0, 100.0, 8).unwrap();
        assert!((circle.x - 50.0).abs() < 0.1);
        assert!((circle.y - 40.0).abs() < 0.1);
        assert!((circle.r - 20.0).abs() < 0.1);
        assert!(fit_circle(&boundary, 50.5, 40.5, 4.0, 100.0, 1000).is_none());
    }

    #[test]
    fn fit_circle_pulls_offset_hypothesis_onto_partial_arc() {
        // Only a third of the circle, seen from a center 5 px off.
        let boundary: Vec<(f32, f32)> = (-60..=60)
            .map(|deg| {
                let t = (deg as f32).to_radians();
                (50.0 + 20.0 * t.cos(), 40.0 + 20.0 * t.sin())
            })
            .collect();
        let circle = fit_circle(&boundary, 54.0, 43.0, 4.0, 100.0, 8).unwrap();
        assert!((circle.x - 50.0).abs() < 0.1, "{:?}", circle);
        assert!((circle.y - 40.0).abs() < 0.1, "{:?}", circle);
        assert!((circle.r - 20.0).abs() < 0.1, "{:?}", circle);
    }

    #[test]
    fn least_squares_circle_rejects_collinear_points() {
        let line: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64)).collect();
        assert!(least_squares_circle(&line).is_none());
        assert!(least_squares_circle(&line[..2]).is_none());
    }

    #[test]
    fn overlapping_circles_are_the_same_disc() {
        let kept = vec![(160, 120, 35), (20, 20, 3)];
        assert!(is_duplicate(&kept, 158, 125, 40));
        assert!(is_duplicate(&kept, 190, 120, 10));
        assert!(!is_duplicate(&kept, 200, 120, 10));
        // Small circles still merge within 5 px.
        assert!(is_duplicate(&kept, 24, 22, 3));
        assert!(!is_duplicate(&kept, 26, 20, 3));
        assert!(!is_duplicate(&[], 160, 120, 35));
    }

    #[test]
    fn single_disc_yields_one_centered_candidate_across_radii() {
        let centers = [(160, 120), (161, 121), (163, 118), (158, 123)];
        let mut detector = HoughDetector::new();
        for r in 16..=48 {
            for &(cx, cy) in &centers {
                let mut mask = GrayImage::new(320, 240);
                draw_filled_circle_mut(&mut mask, (cx, cy), r, ON);

                let found = detector.detect(&mask, &DetectParams::default());
                assert_eq!(found.len(), 1, "r={} c=({}, {}): {:?}", r, cx, cy, found);
                let err = ((found[0].center.0 - cx as f32).powi(2)
                    + (found[0].center.1 - cy as f32).powi(2))
                .sqrt();
                assert!(err <= 1.5, "r={} c=({}, {}): {:?}", r, cx, cy, found);
                assert!(
                    (found[0].radius - r as f32).abs() <= 2.0,
                    "r={} c=({}, {}): {:?}",
                    r,
                    cx,
                    cy,
                    found
                );
            }
        }
    }

    #[test]
    fn two_discs_are_each_found_once() {
        let mut mask = GrayImage::new(300, 200);
        draw_filled_circle_mut(&mut mask, (100, 100), 25, ON);
        draw_filled_circle_mut(&mut mask, (200, 100), 25, ON);

        let found = HoughDetector::new().detect(&mask, &DetectParams::default());
        assert_eq!(found.len(), 2, "{:?}", found);
        for (cx, cy) in [(100.0, 100.0), (200.0, 100.0)] {
            let hits = found
                .iter()
                .filter(|c| (c.center.0 - cx).abs() <= 1.5 && (c.center.1 - cy).abs() <= 1.5)
                .count();
            assert_eq!(hits, 1, "({}, {}) in {:?}", cx, cy, found);
        }
    }

    #[test]
    fn huge_min_radius_finds_nothing() {
        let mut mask = GrayImage::new(160, 120);
        draw_filled_circle_mut(&mut mask, (70, 60), 25, ON);
        let params = DetectParams {
            min_radius: u32::MAX,
            ..DetectParams::default()
        };
        assert!(HoughDetector::new().detect(&mask, &params).is_empty());
    }
}
