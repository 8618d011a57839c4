/// A single-frame circular detection. Carries no identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Center in frame pixels.
    pub center: (f32, f32),
    /// Radius in pixels.
    pub radius: f32,
}

impl Candidate {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            center: (x, y),
            radius,
        }
    }

    pub fn distance_sq_to(&self, point: (f32, f32)) -> f32 {
        let dx = self.center.0 - point.0;
        let dy = self.center.1 - point.1;
        dx * dx + dy * dy
    }

    pub fn distance_to(&self, point: (f32, f32)) -> f32 {
        self.distance_sq_to(point).sqrt()
    }
}

/// Sort by radius, largest first, and keep at most `max_count`.
///
/// The sort is stable so equal radii keep discovery order.
pub(crate) fn rank_by_radius(mut candidates: Vec<Candidate>, max_count: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.radius.total_cmp(&a.radius));
    candidates.truncate(max_count);
    candidates
}
