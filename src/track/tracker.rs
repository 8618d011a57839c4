use crate::detect::Candidate;
use crate::track::Slot;
use crate::SLOT_COUNT;

/// Slot index to candidate index mapping for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Assignment {
    pub slots: [Option<usize>; SLOT_COUNT],
}

impl Assignment {
    pub fn candidate_for(&self, slot: usize) -> Option<usize> {
        self.slots.get(slot).copied().flatten()
    }
}

/// Greedy nearest-neighbor assignment of candidates to slots.
///
/// Slots with a previous position are paired with candidates in ascending
/// squared distance, each side used at most once. Candidates left over then
/// fill slots that had no previous position, in candidate order. Anything
/// beyond [`SLOT_COUNT`] is dropped.
pub fn assign_greedy(
    previous: &[Option<(f32, f32)>; SLOT_COUNT],
    candidates: &[Candidate],
) -> Assignment {
    let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
    for (slot, prev) in previous.iter().enumerate() {
        let Some(prev) = prev else { continue };
        for (idx, candidate) in candidates.iter().enumerate() {
            pairs.push((candidate.distance_sq_to(*prev), slot, idx));
        }
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut assignment = Assignment::default();
    let mut used = vec![false; candidates.len()];
    for (_, slot, idx) in pairs {
        if assignment.slots[slot].is_some() || used[idx] {
            continue;
        }
        assignment.slots[slot] = Some(idx);
        used[idx] = true;
    }

    let mut leftovers = (0..candidates.len()).filter(|&i| !used[i]);
    for slot in 0..SLOT_COUNT {
        if previous[slot].is_none() && assignment.slots[slot].is_none() {
            match leftovers.next() {
                Some(idx) => assignment.slots[slot] = Some(idx),
                None => break,
            }
        }
    }
    assignment
}

/// Keeps the two slots continuous across frames.
#[derive(Clone, Debug, Default)]
pub struct IdentityTracker {
    slots: [Slot; SLOT_COUNT],
}

impl IdentityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> &[Slot; SLOT_COUNT] {
        &self.slots
    }

    /// Positions reported after the previous frame.
    pub fn positions(&self) -> [Option<Candidate>; SLOT_COUNT] {
        [self.slots[0].position(), self.slots[1].position()]
    }

    /// Match this frame's candidates and run every slot's stability filter.
    pub fn update(
        &mut self,
        candidates: &[Candidate],
        deadband_px: f32,
        hold_frames: u32,
    ) -> [Option<Candidate>; SLOT_COUNT] {
        let previous = self.positions().map(|p| p.map(|c| c.center));
        let assignment = assign_greedy(&previous, candidates);
        let mut reported = [None; SLOT_COUNT];
        for (slot, out) in reported.iter_mut().enumerate() {
            let matched = assignment.candidate_for(slot).map(|idx| candidates[idx]);
            *out = self.slots[slot].observe(matched, deadband_px, hold_frames);
        }
        reported
    }
}
