//! Controller output path.
//!
//! The frame loop submits debounced hit pairs into a latest-wins
//! [`WriteQueue`]; a [`PlcWriter`] thread drains it and pushes changed tags
//! through a [`ControllerLink`]. [`enip::EnipLink`] speaks EtherNet/IP to
//! Logix-class controllers; tests plug in recording fakes.

mod clock;
pub mod enip;
mod link;
mod queue;
mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use enip::EnipLink;
pub use link::{ControllerEndpoint, ControllerLink, DEFAULT_ENIP_PORT};
pub use queue::{HitPair, WriteQueue};
pub use writer::{HitOutput, PlcWriter, WriterConfig, WriterCore, WriterState, WriterStatus};
