//! Cross-frame state: slot identity, position smoothing and hit debouncing.
//!
//! Everything here is driven once per processed frame by
//! [`crate::pipeline::PipelineState`] and owns no threads or I/O.

mod hit;
mod stability;
mod tracker;

pub use hit::{HitEvaluator, HitState, TargetZone};
pub use stability::Slot;
pub use tracker::{assign_greedy, Assignment, IdentityTracker};
