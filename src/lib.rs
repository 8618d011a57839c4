//! Hit-zone detector
//!
//! This crate watches a live camera feed for colored circular markers and
//! decides, for each of two fixed target zones, whether a marker currently
//! sits inside it. The stable two-slot "hit" signal is pushed to an
//! industrial controller by an independently scheduled writer.
//!
//! # Architecture
//!
//! One frame flows through the pipeline in strict order:
//!
//! 1. **Segment**: color frame -> binary mask of marker-colored pixels.
//! 2. **Detect**: mask -> up to two circular candidates (fast contour or robust Hough).
//! 3. **Track**: candidates -> two identity slots by nearest-neighbor continuity.
//! 4. **Stabilize**: per-slot deadband + hold (display positions only).
//! 5. **Evaluate**: raw candidates -> per-zone hysteresis + asymmetric debounce.
//! 6. **Submit**: debounced pair -> latest-wins writer queue.
//!
//! The writer owns its own connection and thread. The queue is the only
//! shared state between the two units of work.
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `tuning`: per-frame tuning snapshot and the shared store it comes from
//! - `frame` / `ingest`: frames and frame sources
//! - `detect`: segmentation and candidate detection
//! - `track`: slot assignment, stability filter, hit evaluation
//! - `pipeline` / `runner`: per-frame state machine and the frame loop
//! - `transport`: controller link, writer state machine, EtherNet/IP client

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod runner;
pub mod track;
pub mod transport;
pub mod tuning;

pub use config::{ConfigWatcher, HitzoneConfig};
pub use detect::{
    Candidate, CandidateDetector, ContourDetector, DetectorMode, DetectorSet, HoughDetector,
    Segmenter,
};
pub use frame::Frame;
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use ingest::{CameraConfig, CameraSource, FrameSource, SourceStats};
pub use pipeline::{FrameReport, PipelineState};
pub use runner::{FrameLoop, LoopPolicy, LoopStats};
pub use track::{assign_greedy, Assignment, HitEvaluator, HitState, IdentityTracker, Slot, TargetZone};
pub use transport::{
    Clock, ControllerEndpoint, ControllerLink, EnipLink, HitOutput, HitPair, ManualClock,
    PlcWriter, SystemClock, WriteQueue, WriterConfig, WriterCore, WriterState, WriterStatus,
};
pub use tuning::{Tuning, TuningStore, ZoneSpec};

/// Number of tracked marker slots and target zones.
pub const SLOT_COUNT: usize = 2;
