//! Safety chain and position cross-check
//!
//! The interlock is polled first on every tick and gates all motion. The
//! tracker compares the fence against an independent encoder.

pub mod interlock;
pub mod tracker;

pub use interlock::{InterlockEvent, SafetyError, SafetyInterlock};
pub use tracker::{PositionTracker, TrackerStatus};
