use crate::detect::Candidate;
use crate::SLOT_COUNT;

/// A circular target region in frame pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetZone {
    pub center: (f32, f32),
    pub radius: f32,
}

impl TargetZone {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self {
            center: (x, y),
            radius,
        }
    }

    /// Radius minus center distance; positive when the point is inside.
    pub fn margin(&self, point: (f32, f32)) -> f32 {
        let dx = point.0 - self.center.0;
        let dy = point.1 - self.center.1;
        self.radius - (dx * dx + dy * dy).sqrt()
    }

    /// Largest margin over all candidates, `-inf` when there are none.
    pub fn best_margin(&self, candidates: &[Candidate]) -> f32 {
        candidates
            .iter()
            .map(|c| self.margin(c.center))
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

/// Per-zone hysteresis and debounce state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HitState {
    /// Hysteresis output (INSIDE = true).
    pub raw: bool,
    /// Externally visible value.
    pub debounced: bool,
    pub consecutive_off: u32,
}

impl HitState {
    /// Advance one frame given the best margin for this zone.
    ///
    /// Enters INSIDE at `margin >= deadband`, leaves at `margin <= -deadband`.
    /// ON propagates at once; OFF needs `off_frames` consecutive raw-OFF frames.
    pub fn step(&mut self, margin: f32, deadband_px: f32, off_frames: u32) -> bool {
        if !self.raw {
            if margin >= deadband_px {
                self.raw = true;
            }
        } else if margin <= -deadband_px {
            self.raw = false;
        }

        if self.raw {
            self.debounced = true;
            self.consecutive_off = 0;
        } else {
            self.consecutive_off += 1;
            if self.consecutive_off >= off_frames {
                self.debounced = false;
                self.consecutive_off = 0;
            }
        }
        self.debounced
    }
}

#[derive(Clone, Debug, Default)]
pub struct HitEvaluator {
    states: [HitState; SLOT_COUNT],
}

impl HitEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> &[HitState; SLOT_COUNT] {
        &self.states
    }

    pub fn debounced(&self) -> [bool; SLOT_COUNT] {
        [self.states[0].debounced, self.states[1].debounced]
    }

    /// Evaluate every zone against the raw (unslotted) candidates of this frame.
    pub fn evaluate(
        &mut self,
        zones: &[TargetZone; SLOT_COUNT],
        candidates: &[Candidate],
        deadband_px: f32,
        off_frames: u32,
    ) -> [bool; SLOT_COUNT] {
        for (state, zone) in self.states.iter_mut().zip(zones) {
            state.step(zone.best_margin(candidates), deadband_px, off_frames);
        }
        self.debounced()
    }
}
