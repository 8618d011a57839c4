//! Contour geometry shared by both detector backends.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::f64::consts::PI;

/// Fixed seed: the enclosing-circle shuffle must not make detection nondeterministic.
const ENCLOSING_SHUFFLE_SEED: u64 = 0x5eed_c1c1e;
const EPS: f64 = 1e-7;

/// Area and perimeter of one traced boundary.
#[derive(Clone, Debug)]
pub(crate) struct Outline {
    pub points: Vec<Point<i32>>,
    pub area: f64,
    pub perimeter: f64,
}

impl Outline {
    fn new(points: Vec<Point<i32>>) -> Self {
        let area = polygon_area(&points);
        let perimeter = closed_arc_length(&points);
        Self {
            points,
            area,
            perimeter,
        }
    }

    /// 4*pi*area / perimeter^2; 1.0 for an ideal circle.
    pub fn circularity(&self) -> f64 {
        circularity(self.area, self.perimeter)
    }
}

pub(crate) fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    4.0 * PI * area / (perimeter * perimeter)
}

/// Outermost borders only; blobs nested inside holes are ignored.
pub(crate) fn outer_outlines(mask: &GrayImage) -> Vec<Outline> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Outline::new(c.points))
        .collect()
}

/// The outermost border enclosing the most area, if any.
pub(crate) fn largest_outline(mask: &GrayImage) -> Option<Outline> {
    outer_outlines(mask)
        .into_iter()
        .fold(None, |best: Option<Outline>, next| match best {
            Some(b) if b.area >= next.area => Some(b),
            _ => Some(next),
        })
}

/// Shoelace area of a closed polygon.
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice.abs() as f64) / 2.0
}

pub(crate) fn closed_arc_length(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| {
            let dx = (q.x - p.x) as f64;
            let dy = (q.y - p.y) as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Smallest circle containing every point (Welzl, iterative form).
///
/// Returns `(cx, cy, radius)`; `None` for an empty point set.
pub(crate) fn min_enclosing_circle(points: &[Point<i32>]) -> Option<(f64, f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    if pts.is_empty() {
        return None;
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(ENCLOSING_SHUFFLE_SEED);
    pts.shuffle(&mut rng);

    let mut c = Circle::point(pts[0]);
    for i in 1..pts.len() {
        if c.contains(pts[i]) {
            continue;
        }
        c = Circle::point(pts[i]);
        for j in 0..i {
            if c.contains(pts[j]) {
                continue;
            }
            c = Circle::diameter(pts[i], pts[j]);
            for k in 0..j {
                if !c.contains(pts[k]) {
                    c = Circle::through(pts[i], pts[j], pts[k]);
                }
            }
        }
    }
    Some((c.x, c.y, c.r))
}

/// Number of nonzero mask pixels whose center lies within `r` of `(cx, cy)`.
pub(crate) fn count_inside_circle(mask: &GrayImage, cx: i64, cy: i64, r: i64) -> u64 {
    let (w, h) = mask.dimensions();
    let x0 = (cx - r).max(0);
    let y0 = (cy - r).max(0);
    let x1 = (cx + r).min(w as i64 - 1);
    let y1 = (cy + r).min(h as i64 - 1);
    let mut count = 0;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x - cx;
            let dy = y - cy;
            if dx * dx + dy * dy <= r * r && mask.get_pixel(x as u32, y as u32)[0] > 0 {
                count += 1;
            }
        }
    }
    count
}

#[derive(Clone, Copy, Debug)]
struct Circle {
    x: f64,
    y: f64,
    r: f64,
}

impl Circle {
    fn point(p: (f64, f64)) -> Self {
        Self { x: p.0, y: p.1, r: 0.0 }
    }

    fn diameter(a: (f64, f64), b: (f64, f64)) -> Self {
        let x = (a.0 + b.0) / 2.0;
        let y = (a.1 + b.1) / 2.0;
        Self {
            x,
            y,
            r: ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt(),
        }
    }

    fn through(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < EPS {
            // Collinear: the widest pair spans the rest.
            let candidates = [Self::diameter(a, b), Self::diameter(a, c), Self::diameter(b, c)];
            return candidates
                .into_iter()
                .fold(candidates[0], |best, next| if next.r > best.r { next } else { best });
        }
        let a2 = a.0 * a.0 + a.1 * a.1;
        let b2 = b.0 * b.0 + b.1 * b.1;
        let c2 = c.0 * c.0 + c.1 * c.1;
        let x = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / d;
        let y = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / d;
        Self {
            x,
            y,
            r: ((a.0 - x).powi(2) + (a.1 - y).powi(2)).sqrt(),
        }
    }

    fn contains(&self, p: (f64, f64)) -> bool {
        ((p.0 - self.x).powi(2) + (p.1 - self.y).powi(2)).sqrt() <= self.r + EPS.max(self.r * 1e-9)
    }
}
