use crate::detect::Candidate;

/// One tracking channel with deadband and dropout hold.
///
/// The reported position feeds display and logging only. Hit evaluation
/// reads raw candidates and never looks at slots.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Slot {
    last_candidate: Option<Candidate>,
    hold_remaining: u32,
}

impl Slot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Position currently reported for this slot.
    pub fn position(&self) -> Option<Candidate> {
        self.last_candidate
    }

    pub fn hold_remaining(&self) -> u32 {
        self.hold_remaining
    }

    /// Feed this frame's matched candidate (if any) and return what the slot reports.
    pub fn observe(
        &mut self,
        matched: Option<Candidate>,
        deadband_px: f32,
        hold_frames: u32,
    ) -> Option<Candidate> {
        match matched {
            Some(current) => {
                self.hold_remaining = hold_frames;
                let next = match self.last_candidate {
                    Some(prev) if current.distance_sq_to(prev.center) <= deadband_px * deadband_px => {
                        Candidate {
                            center: prev.center,
                            radius: current.radius,
                        }
                    }
                    _ => current,
                };
                self.last_candidate = Some(next);
            }
            None => {
                if self.last_candidate.is_some() && self.hold_remaining > 0 {
                    self.hold_remaining -= 1;
                } else {
                    self.last_candidate = None;
                }
            }
        }
        self.last_candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, y: f32) -> Candidate {
        Candidate::new(x, y, 10.0)
    }

    #[test]
    fn jitter_inside_deadband_keeps_previous_center() {
        let mut slot = Slot::new();
        slot.observe(Some(cand(50.0, 50.0)), 1.0, 4);

        let reported = slot.observe(Some(Candidate::new(50.6, 50.6, 11.0)), 1.0, 4);
        let reported = reported.unwrap();
        assert_eq!(reported.center, (50.0, 50.0));
        assert_eq!(reported.radius, 11.0);

        let moved = slot.observe(Some(cand(53.0, 50.0)), 1.0, 4).unwrap();
        assert_eq!(moved.center, (53.0, 50.0));
    }

    #[test]
    fn hold_bridges_dropout_then_reports_absent() {
        let mut slot = Slot::new();
        slot.observe(Some(cand(10.0, 20.0)), 1.0, 2);
        assert_eq!(slot.hold_remaining(), 2);

        assert_eq!(slot.observe(None, 1.0, 2), Some(cand(10.0, 20.0)));
        assert_eq!(slot.observe(None, 1.0, 2), Some(cand(10.0, 20.0)));
        assert_eq!(slot.observe(None, 1.0, 2), None);
        assert_eq!(slot.observe(None, 1.0, 2), None);
    }

    #[test]
    fn reacquire_resets_hold() {
        let mut slot = Slot::new();
        slot.observe(Some(cand(0.0, 0.0)), 1.0, 2);
        slot.observe(None, 1.0, 2);
        assert_eq!(slot.hold_remaining(), 1);
        slot.observe(Some(cand(5.0, 5.0)), 1.0, 2);
        assert_eq!(slot.hold_remaining(), 2);
    }

    #[test]
    fn zero_hold_drops_immediately() {
        let mut slot = Slot::new();
        slot.observe(Some(cand(0.0, 0.0)), 1.0, 0);
        assert_eq!(slot.observe(None, 1.0, 0), None);
    }
}
